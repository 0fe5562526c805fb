//! `zerotohire onboard`: first-time setup.

use zerotohire_config::AppConfig;

use super::CliResult;

const SAMPLE_PROBLEMS: &str = r#"[
  {
    "id": 1,
    "title": "Two Sum",
    "difficulty": "Easy",
    "description": "Given an array of integers nums and an integer target, return indices of the two numbers such that they add up to target.",
    "topics": ["Array", "Hash Table"]
  },
  {
    "id": 20,
    "title": "Valid Parentheses",
    "difficulty": "Easy",
    "description": "Given a string containing just the characters '(', ')', '{', '}', '[' and ']', determine if the input string is valid.",
    "topics": ["String", "Stack"]
  },
  {
    "id": 70,
    "title": "Climbing Stairs",
    "difficulty": "Easy",
    "description": "You are climbing a staircase. It takes n steps to reach the top. Each time you can climb 1 or 2 steps. In how many distinct ways can you climb to the top?",
    "topics": ["Math", "Dynamic Programming", "Memoization"]
  },
  {
    "id": 200,
    "title": "Number of Islands",
    "difficulty": "Medium",
    "description": "Given an m x n 2D binary grid which represents a map of '1's (land) and '0's (water), return the number of islands.",
    "topics": ["Array", "Depth-First Search", "Breadth-First Search", "Union Find", "Matrix"]
  },
  {
    "id": 104,
    "title": "Maximum Depth of Binary Tree",
    "difficulty": "Easy",
    "description": "Given the root of a binary tree, return its maximum depth.",
    "topics": ["Tree", "Depth-First Search", "Breadth-First Search", "Binary Tree"]
  }
]
"#;

pub async fn run() -> CliResult {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("ZeroToHire: First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
    }

    let config = AppConfig::load_from(&config_path)?;
    let corpus_path = config.corpus_path();
    if corpus_path.exists() {
        println!("  Problem set found: {}", corpus_path.display());
    } else {
        std::fs::write(&corpus_path, SAMPLE_PROBLEMS)?;
        println!("✅ Wrote a small sample problem set to {}", corpus_path.display());
        println!("   Replace it with a full JSON problem set when you have one.");
    }

    println!("\n📝 Next steps:");
    println!("   1. Start a llama.cpp, Ollama, or vLLM server (or set an OpenAI key)");
    println!("   2. Point [inference] in {} at it", config_path.display());
    println!("   3. Run: zerotohire doctor");
    println!("   4. Run: zerotohire chat\n");

    Ok(())
}

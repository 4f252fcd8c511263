//! `clinq onboard` — First-time setup.

use clinq_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("clinq — First-Time Setup");
    println!("========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    } else {
        println!("Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\nConfig already exists at: {}", config_path.display());
        println!("Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Created config.toml at: {}", config_path.display());
    println!("\nNext steps:");
    println!("   1. Set CLINQ_API_KEY (or OPENAI_API_KEY) for the answering model");
    println!("   2. Set TAVILY_API_KEY to enable trusted web search");
    println!("   3. Point retrieval.local.endpoint at your knowledge-base search service");
    println!("   4. Run: clinq ask \"What are the red flags for back pain?\"\n");

    Ok(())
}

//! `parlor init` — first-time setup.

use parlor_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Parlor — First-Time Setup");
    println!("=========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run init.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("   Data will be stored in: {}", AppConfig::default().storage.data_path().display());
    println!("\n📝 Next steps:");
    println!("   1. Set API_KEY under [api] in {} (or export PARLOR_API_KEY)", config_path.display());
    println!("   2. Run: parlor chat");
    println!();

    Ok(())
}

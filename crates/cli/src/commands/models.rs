//! `parlor models` — model ids offered by the configured endpoint.

use super::Runtime;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::boot().await?;
    let settings = rt.controller.read(|state| state.settings.clone()).await;

    println!("🔌 Models at {}", settings.api_url);
    let models = rt.adapter.list_models(&settings).await?;
    if models.is_empty() {
        println!("   (the endpoint listed no models)");
    }
    for id in models {
        let marker = if id == settings.model { "*" } else { " " };
        println!("  {marker} {id}");
    }
    Ok(())
}

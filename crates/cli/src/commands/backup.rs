//! `parlor export` / `parlor import` / `parlor backup` — whole-store backups.

use parlor_memory::{BackupEnvelope, BackupTransport, HttpBackup, export_backup, import_backup};

use super::Runtime;

pub async fn export(output: &str) -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::boot().await?;
    let data = export_backup(rt.repository.store().as_ref()).await?;
    let json = serde_json::to_string_pretty(&data)?;
    std::fs::write(output, &json)?;
    println!("📤 Exported {} records to {output} ({} bytes)", data.len(), json.len());
    Ok(())
}

pub async fn import(input: &str) -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::boot().await?;
    let text = std::fs::read_to_string(input)?;
    let summary = import_backup(rt.repository.store().as_ref(), &text).await?;
    println!("📥 Restored {} records from {input}", summary.keys_written);
    Ok(())
}

pub async fn push() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::boot().await?;
    let remote = remote(&rt).await?;

    let data = export_backup(rt.repository.store().as_ref()).await?;
    let envelope = BackupEnvelope::new(data);
    remote.upload(&envelope).await?;
    println!("☁️  Uploaded backup ({} records, {})", envelope.data.len(), envelope.backup_at);
    Ok(())
}

pub async fn pull() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::boot().await?;
    let remote = remote(&rt).await?;

    let envelope = remote.download().await?;
    let document = serde_json::to_string(&envelope)?;
    let summary = import_backup(rt.repository.store().as_ref(), &document).await?;
    println!(
        "☁️  Restored {} records from the backup taken {}",
        summary.keys_written, envelope.backup_at
    );
    Ok(())
}

async fn remote(rt: &Runtime) -> Result<HttpBackup, Box<dyn std::error::Error>> {
    let (url, token) = rt
        .controller
        .read(|state| (state.settings.backup_url.clone(), state.settings.backup_token.clone()))
        .await;
    Ok(HttpBackup::new(rt.transport.clone(), url, token)?)
}

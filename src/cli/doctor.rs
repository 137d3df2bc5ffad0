//! CLI `doctor` command: check configuration and pointer cache health.

use anyhow::{Context, Result};

use intentmem::config::IntentMemConfig;
use intentmem::db;
use intentmem::memory::cache::list_pointers;

/// Print a configuration summary and a pointer cache health report.
pub fn doctor(config: &IntentMemConfig) -> Result<()> {
    println!("intentmem Health Report");
    println!("=======================");
    println!();
    println!("Generation:");
    println!("  API base:        {}", config.generation.api_base);
    println!(
        "  API key:         {}",
        if config.generation.api_key.trim().is_empty() {
            "MISSING (set GEMINI_API_KEY)"
        } else {
            "set"
        }
    );
    println!("  Flash model:     {}", config.generation.flash_model);
    println!("  Pro model:       {}", config.generation.pro_model);
    println!();
    println!("Blob store:");
    println!("  Publisher:       {}", config.blob.publisher_url);
    println!("  Aggregator:      {}", config.blob.aggregator_url);
    println!("  Epochs:          {}", config.blob.epochs);
    println!();

    let db_path = config.resolved_cache_path();
    if !db_path.exists() {
        println!("Pointer cache: not found at {}", db_path.display());
        println!("It is created on the first `intentmem chat` session.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
    let conn = db::open_database(&db_path).context("failed to open pointer cache (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("Pointer cache:     {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!("Wallets cached:    {}", report.pointer_count);
    println!(
        "Last write:        {}",
        report.last_write.as_deref().unwrap_or("(never)")
    );
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("The cache only holds pointers; delete {} to rebuild it.", db_path.display());
        println!("Snapshots stay in the blob store, but wallets start fresh until their next save.");
    }

    let rows = list_pointers(&conn)?;
    if !rows.is_empty() {
        println!();
        println!("Recent wallets:");
        for row in rows.iter().take(5) {
            println!("  {}  {}  ({})", row.identity, row.pointer, row.updated_at);
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

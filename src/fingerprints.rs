//! Fingerprint listing for `csync fingerprints`.

use anyhow::Result;

use corpus_sync_core::models::ContentFingerprint;
use corpus_sync_core::store::FingerprintStore;

use crate::config::Config;
use crate::sqlite_store::SqliteFingerprintStore;

/// All stored fingerprints, sorted by content id.
pub async fn list_fingerprints(store: &dyn FingerprintStore) -> Result<Vec<ContentFingerprint>> {
    let mut all: Vec<ContentFingerprint> = store.get_all().await?.into_values().collect();
    all.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(all)
}

pub async fn run_fingerprints(config: &Config, json: bool) -> Result<()> {
    let store = SqliteFingerprintStore::open(config).await?;
    let all = list_fingerprints(&store).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&all)?);
        return Ok(());
    }

    if all.is_empty() {
        println!("No fingerprints stored.");
        return Ok(());
    }

    println!(
        "{:<24} {:<9} {:<24} {:<14} UPDATED",
        "ID", "KIND", "REMOTE ID", "HASH"
    );
    for fp in &all {
        println!(
            "{:<24} {:<9} {:<24} {:<14} {}",
            fp.id,
            fp.kind.as_str(),
            fp.remote_id,
            short_hash(&fp.content_hash),
            fp.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!("{} fingerprint(s)", all.len());
    Ok(())
}

/// First 12 characters of a hash, cut on a char boundary.
fn short_hash(hash: &str) -> &str {
    hash.char_indices().nth(12).map_or(hash, |(end, _)| &hash[..end])
}

//! Quick connection check against whatever `SURREALDB_*` selects
//! Run with: cargo run --package prompt-eval-state --example check_connection

use prompt_eval_state::{RunRegistry, StoreTarget, SurrealResultStore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    println!("Testing SurrealDB connection...");

    let target = match StoreTarget::from_env() {
        Ok(target) => target,
        Err(e) => {
            eprintln!("✗ Invalid store configuration: {}", e);
            std::process::exit(1);
        }
    };

    match &target {
        StoreTarget::Remote(config) => {
            println!("  Endpoint: {}", config.endpoint);
            println!("  Namespace: {}", config.namespace);
            println!("  Database: {}", config.database);
            println!("  User: {} ({:?})", config.username, config.auth);
        }
        StoreTarget::Url(url) => println!("  URL: {}", url),
        StoreTarget::Local(path) => println!("  Local: {}", path.display()),
    }

    match SurrealResultStore::connect(target).await {
        Ok(store) => {
            println!("\n✓ Connected and schema initialized");
            match store.list_runs().await {
                Ok(runs) => println!("✓ {} run(s) stored", runs.len()),
                Err(e) => eprintln!("✗ Listing runs failed: {}", e),
            }
        }
        Err(e) => {
            eprintln!("\n✗ Connection failed: {}", e);
            std::process::exit(1);
        }
    }
}

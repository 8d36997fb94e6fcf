use std::sync::Arc;

use anyhow::{bail, Context, Result};

use adventure_forge::config::AppConfig;
use adventure_forge::core::cache::ResponseCache;
use adventure_forge::core::credits::{CreditLedger, CreditSource};
use adventure_forge::core::generation::{Difficulty, GenerationOrchestrator, Party, ScaffoldParams};
use adventure_forge::core::llm::OpenAICompatibleClient;
use adventure_forge::database::Database;

const USAGE: &str = "usage: adventure-forge <command>

commands:
  balance <user_id>                        show credits and lifetime purchases
  grant <user_id> <amount>                 add operator-granted credits
  cache-stats                              show response cache totals
  scaffold <user_id> <frame> <size> <level> <focus>
                                           generate an adventure outline (1 credit)";

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load();
    let data_dir = config.data_dir();

    // Initialize logging
    let _log_guard = adventure_forge::core::logging::init(&config.logging, &data_dir);
    log::info!("{} v{} starting", adventure_forge::NAME, adventure_forge::VERSION);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{USAGE}");
        return Ok(());
    };

    let db = Database::new(&data_dir)
        .await
        .with_context(|| format!("failed to open database in {}", data_dir.display()))?;

    let result = run(&config, &db, command, &args[1..]).await;
    db.close().await;
    result
}

async fn run(config: &AppConfig, db: &Database, command: &str, args: &[String]) -> Result<()> {
    match (command, args) {
        ("balance", [user_id]) => {
            let balance = CreditLedger::new(db.clone()).balance(user_id).await?;
            println!("{}: {} credits ({} purchased)", balance.user_id, balance.credits, balance.total_purchased);
        }
        ("grant", [user_id, amount]) => {
            let amount: i64 = amount.parse().with_context(|| format!("invalid amount: {amount}"))?;
            let balance = CreditLedger::new(db.clone())
                .add_credits(user_id, amount, CreditSource::Grant { reason: "operator grant".into() })
                .await?;
            println!("{user_id}: {balance} credits");
        }
        ("cache-stats", []) => {
            let stats = ResponseCache::new(db.clone()).stats().await?;
            println!(
                "entries: {}\nhits+stores: {}\ntokens stored: {}",
                stats.entry_count, stats.total_accesses, stats.total_tokens
            );
        }
        ("scaffold", [user_id, frame, size, level, focus @ ..]) if !focus.is_empty() => {
            let size: u8 = size.parse().with_context(|| format!("invalid party size: {size}"))?;
            let level: u8 = level.parse().with_context(|| format!("invalid party level: {level}"))?;
            let client = OpenAICompatibleClient::from_config(&config.llm)?;
            let orchestrator = GenerationOrchestrator::from_config(db.clone(), Arc::new(client), &config.generation)
                .with_max_tokens(config.llm.max_tokens);

            let generated = orchestrator
                .generate_scaffold(ScaffoldParams {
                    user_id: user_id.clone(),
                    adventure_id: None,
                    frame: frame.clone(),
                    focus: focus.join(" "),
                    party: Party::new(size, level),
                    difficulty: Difficulty::default(),
                    stakes: String::new(),
                })
                .await?;

            let scaffold = &generated.output.scaffold;
            println!("{} [{}]", scaffold.title, generated.output.adventure_id);
            println!("{}\n", scaffold.description);
            for (i, movement) in scaffold.movements.iter().enumerate() {
                println!("{}. {} ({})\n   {}", i + 1, movement.title, movement.scene_type, movement.description);
            }
            println!(
                "\n{} credits remaining{}",
                generated.credits_remaining,
                if generated.cache_hit { " (cached)" } else { "" }
            );
        }
        _ => bail!("unrecognized command\n\n{USAGE}"),
    }
    Ok(())
}

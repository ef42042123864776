use anyhow::Result;
use log::{info, warn};

use pow_ledger::{Blockchain, ChainConfig};

const REWARD_ADDRESS: &str = "my-blockchain-address";

fn main() -> Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = ChainConfig::load()?;
    info!(
        "Starting ledger: difficulty={}, workers={}, reward={} from {:?}",
        config.difficulty, config.workers, config.reward_amount, config.reward_sender
    );

    let blockchain = Blockchain::new(REWARD_ADDRESS, config)?;

    blockchain.add_transaction("Alice", "Bob", 100.0);
    blockchain.add_transaction("Bob", "Alice", 50.0);
    blockchain.mine()?;

    blockchain.add_transaction("Gabriel", "Jessica", 250.0);
    blockchain.mine()?;

    blockchain.show();

    println!("Blockchain {:.1}", blockchain.calculate_total_amount(REWARD_ADDRESS));
    println!("Gabriel {:.1}", blockchain.calculate_total_amount("Gabriel"));
    println!("Jessica {:.1}", blockchain.calculate_total_amount("Jessica"));

    if !blockchain.is_valid() {
        warn!("Chain failed verification");
    }

    Ok(())
}

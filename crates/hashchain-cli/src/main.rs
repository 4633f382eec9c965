use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "hashchain-cli")]
#[command(about = "CLI client for the hashchain node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, env = "HASHCHAIN_NODE", default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mine a block carrying the given data
    Mine {
        /// Block payload
        #[arg(long)]
        data: String,
    },
    /// Print the whole chain
    Chain,
    /// Ask the node whether its chain is valid
    Validate,
    /// Print the last block
    Last,
}

#[derive(Serialize)]
struct BlockData {
    data: String,
}

impl Command {
    fn path(&self) -> &'static str {
        match self {
            Command::Mine { .. } => "/mine_block/",
            Command::Chain => "/blockchain/",
            Command::Validate => "/validate/",
            Command::Last => "/blockchain/last/",
        }
    }
}

fn endpoint(node: &str, path: &str) -> String {
    format!("{}{path}", node.trim_end_matches('/'))
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let url = endpoint(&cli.node, cli.cmd.path());
    debug!("requesting {url}");

    let client = reqwest::Client::new();
    let res = match cli.cmd {
        Command::Mine { data } => client.post(&url).json(&BlockData { data }).send().await?,
        Command::Chain | Command::Validate | Command::Last => client.get(&url).send().await?,
    };
    let status = res.status();
    let body = res.text().await?;
    println!("status: {}", status);
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mine_with_custom_node() {
        let cli = Cli::try_parse_from([
            "hashchain-cli",
            "mine",
            "--data",
            "hello",
            "--node",
            "http://10.0.0.1:9000/",
        ])
        .unwrap();
        assert!(matches!(&cli.cmd, Command::Mine { data } if data == "hello"));
        assert_eq!(
            endpoint(&cli.node, cli.cmd.path()),
            "http://10.0.0.1:9000/mine_block/"
        );
    }

    #[test]
    fn read_commands_map_to_routes() {
        assert_eq!(Command::Chain.path(), "/blockchain/");
        assert_eq!(Command::Validate.path(), "/validate/");
        assert_eq!(Command::Last.path(), "/blockchain/last/");
    }

    #[test]
    fn mine_requires_data() {
        assert!(Cli::try_parse_from(["hashchain-cli", "mine"]).is_err());
    }
}

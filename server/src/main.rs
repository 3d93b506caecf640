use clap::Parser;
use server::config::GameConfig;
use server::network::TriviaServer;
use server::questions::{FileQuestionBank, QuestionSource};
use server::storage::{SqliteStore, Store};
use std::path::PathBuf;
use std::sync::Arc;

/// Main-method of the application.
/// Parses command-line arguments, opens the collaborators and runs the
/// accept loop until interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "65001")]
        port: u16,
        /// SQLite database for players and game records
        #[clap(long, default_value = "trivia.db")]
        database: PathBuf,
        /// Directory with one <category>.json question file per category
        #[clap(long, default_value = "data/questions")]
        questions: PathBuf,
    }

    env_logger::init();
    let args = Args::parse();

    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&args.database)?);
    let questions: Arc<dyn QuestionSource> = Arc::new(FileQuestionBank::new(&args.questions));

    let address = format!("{}:{}", args.host, args.port);
    let server = TriviaServer::bind(&address, GameConfig::default(), store, questions).await?;

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}

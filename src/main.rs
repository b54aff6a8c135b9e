use clap::Parser;
use hostdash::{
    arguments::Arguments,
    logger::{self, LogTag},
    run,
};

#[tokio::main]
async fn main() {
    let args = Arguments::parse();

    if let Err(e) = run::run(args).await {
        logger::error(LogTag::System, &format!("{:#}", e));
        std::process::exit(1);
    }
}

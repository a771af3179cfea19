// crates.io
use clap::Parser;
// self
use prism_eval::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = Args::parse();

	prism_eval::run(args).await
}

//! Clear command - deletes every cached result of one callable

use clap::Args;
use tracing::info;

use crate::domain::cache::Signature;
use crate::infrastructure::memo::CacheDecorator;

use super::CallableArgs;

/// Arguments for the clear command
#[derive(Args, Clone, Debug)]
pub struct ClearArgs {
    #[command(flatten)]
    pub callable: CallableArgs,

    /// Backend to clear instead of the configured one
    #[arg(long)]
    pub backend: Option<String>,
}

/// Run the clear command
pub async fn run(args: ClearArgs) -> anyhow::Result<()> {
    let config = super::bootstrap()?;
    let backend = super::create_backend(&config, args.backend.as_deref()).await?;

    let mut decorator = CacheDecorator::new(backend);

    if let Some(prefix) = &args.callable.key_prefix {
        decorator = decorator.with_key_prefix(prefix.clone());
    }

    let memoizer = decorator.memoizer(Signature::new(args.callable.qualified_name()));
    let deleted = memoizer.clear().await?;

    info!(
        namespace = %memoizer.key_builder().namespace(),
        deleted = deleted,
        "Cleared cached results"
    );
    println!("{}", deleted);

    Ok(())
}

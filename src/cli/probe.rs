//! Probe command - checks a backend end to end through a memoized function

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::Args;
use tracing::info;

use crate::domain::cache::{CallArguments, Signature};
use crate::infrastructure::memo::CacheDecorator;

/// Arguments for the probe command
#[derive(Args, Clone, Debug)]
pub struct ProbeArgs {
    /// Backend to probe instead of the configured one
    #[arg(long)]
    pub backend: Option<String>,

    /// Input handed to the probe function
    #[arg(long, default_value_t = 21)]
    pub input: i64,
}

/// Run the probe command
pub async fn run(args: ProbeArgs) -> anyhow::Result<()> {
    let config = super::bootstrap()?;
    let backend = super::create_backend(&config, args.backend.as_deref()).await?;

    info!(backend = ?backend, "Probing cache backend");

    let computed = Arc::new(AtomicUsize::new(0));
    let counter = computed.clone();

    let double = CacheDecorator::new(backend)
        .with_options(config.memo.options())
        .wrap(
            Signature::function(module_path!(), "double").param("x"),
            move |(x,): (i64,)| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(x * 2)
                }
            },
        );

    let input = (args.input,);
    let key = double.memoizer().key(&input.call_args())?;

    // Start from a miss even on persistent backends
    double.cache_delete(&input).await?;

    println!("key:      {}", key);

    let first = double.call(input).await?;
    println!(
        "miss:     {} (computed {} time(s))",
        first,
        computed.load(Ordering::SeqCst)
    );

    let second = double.call(input).await?;
    println!(
        "hit:      {} (computed {} time(s))",
        second,
        computed.load(Ordering::SeqCst)
    );

    println!("exists:   {}", double.cache_exists(&input).await?);
    println!(
        "ttl:      {:?}",
        double.memoizer().remaining_ttl(&input.call_args()).await?
    );
    println!("deleted:  {}", double.cache_delete(&input).await?);

    if computed.load(Ordering::SeqCst) != 1 {
        anyhow::bail!("Backend did not serve the cached value");
    }

    Ok(())
}

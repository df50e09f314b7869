//! Key command - prints the cache key a call would use

use anyhow::Context;
use clap::Args;
use serde_json::{Map, Value};

use crate::domain::cache::{CallArgs, KeyBuilder, Signature};

use super::CallableArgs;

/// Arguments for the key command
#[derive(Args, Clone, Debug)]
pub struct KeyArgs {
    #[command(flatten)]
    pub callable: CallableArgs,

    /// Name of the receiver parameter, for methods
    #[arg(long)]
    pub receiver: Option<String>,

    /// Declared parameter, `name` or `name=<json default>`; repeat in order
    #[arg(long = "param")]
    pub params: Vec<String>,

    /// Catch-all for surplus positional arguments
    #[arg(long)]
    pub rest: Option<String>,

    /// Catch-all for unknown keyword arguments
    #[arg(long)]
    pub keywords: Option<String>,

    /// Receiver value as JSON
    #[arg(long)]
    pub self_value: Option<String>,

    /// Positional arguments as a JSON array
    #[arg(long, default_value = "[]")]
    pub args: String,

    /// Keyword arguments as a JSON object
    #[arg(long, default_value = "{}")]
    pub kwargs: String,

    /// Parameters excluded from the key
    #[arg(long = "ignore")]
    pub ignored: Vec<String>,

    /// Key version (defaults to the configured one)
    #[arg(long)]
    pub key_version: Option<u32>,
}

impl KeyArgs {
    pub fn signature(&self) -> anyhow::Result<Signature> {
        let mut signature = Signature::new(self.callable.qualified_name());

        if let Some(receiver) = &self.receiver {
            signature = signature.receiver(receiver.clone());
        }

        for param in &self.params {
            signature = match param.split_once('=') {
                Some((name, default)) => {
                    let default: Value = serde_json::from_str(default).with_context(|| {
                        format!("Default of parameter '{}' is not valid JSON", name)
                    })?;
                    signature.param_with_default(name, default)
                }
                None => signature.param(param.clone()),
            };
        }

        if let Some(rest) = &self.rest {
            signature = signature.rest(rest.clone());
        }

        if let Some(keywords) = &self.keywords {
            signature = signature.keywords(keywords.clone());
        }

        signature.validate()?;
        Ok(signature)
    }

    pub fn call_args(&self) -> anyhow::Result<CallArgs> {
        let positional: Vec<Value> =
            serde_json::from_str(&self.args).context("--args must be a JSON array")?;
        let keywords: Map<String, Value> =
            serde_json::from_str(&self.kwargs).context("--kwargs must be a JSON object")?;

        let mut call = CallArgs::new();

        if let Some(json) = &self.self_value {
            let receiver: Value =
                serde_json::from_str(json).context("--self-value must be valid JSON")?;
            call = call.receiver(&receiver);
        }

        for value in &positional {
            call = call.arg(value);
        }

        for (name, value) in &keywords {
            call = call.kwarg(name.clone(), value);
        }

        Ok(call)
    }

    pub fn key_builder(&self, default_version: u32) -> anyhow::Result<KeyBuilder> {
        let mut builder = KeyBuilder::new(self.signature()?)
            .with_version(self.key_version.unwrap_or(default_version))
            .ignoring(self.ignored.iter().cloned());

        if let Some(prefix) = &self.callable.key_prefix {
            builder = builder.with_namespace(prefix.clone());
        }

        Ok(builder)
    }
}

/// Run the key command
pub async fn run(args: KeyArgs) -> anyhow::Result<()> {
    let config = super::bootstrap()?;

    let key = args
        .key_builder(config.memo.version)?
        .build(&args.call_args()?)?;

    println!("{}", key);
    Ok(())
}

//! `curfew send`: forward one request line to the daemon.

use crate::cli::SendArgs;
use crate::config::Config;
use crate::context::DaemonContext;
use crate::server;
use anyhow::Context;

pub fn cmd_send(args: SendArgs) -> anyhow::Result<()> {
    let ctx = DaemonContext::resolve(args.home.as_deref())?;
    let config = Config::load(ctx.config_path()).context("failed to load configuration")?;
    let endpoint = ctx.socket_path(&config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let response = runtime.block_on(server::request(&endpoint, &args.request))?;
    println!("{}", response);
    Ok(())
}

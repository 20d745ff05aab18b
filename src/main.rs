// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser;
use edgefirst_genicam::{
    device::DeviceProvider,
    lifecycle::Camera,
    mock::{MockDevice, MockProvider},
    publish::{follow_auto_master, ZenohSinks},
};
use std::{error::Error, sync::Arc};
use tokio::runtime::Handle;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer};
use zenoh::config::Config;

fn init_tracing(args: &Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = || {
        EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy()
    };

    let stdout_log = tracing_subscriber::fmt::layer().with_filter(filter());

    let journald = match tracing_journald::layer() {
        Ok(journald) => Some(journald.with_filter(filter())),
        Err(_) => None,
    };

    let tracy = if args.tracy {
        tracy_client::Client::start();
        Some(tracing_tracy::TracyLayer::default().with_filter(filter()))
    } else {
        None
    };

    let console = args.tokio_console.then(|| {
        console_subscriber::ConsoleLayer::builder()
            .with_default_env()
            .spawn()
    });

    let subscriber = tracing_subscriber::registry()
        .with(stdout_log)
        .with(journald)
        .with(tracy)
        .with(console);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let args = Args::parse();
    init_tracing(&args)?;
    info!(version = env!("CARGO_PKG_VERSION"), "EdgeFirst GenICam publisher");

    let settings = args.camera_settings()?;
    let session = zenoh::open(Config::try_from(&args)?).await?;

    let provider: Box<dyn DeviceProvider> = if args.simulate {
        Box::new(MockProvider::single(MockDevice::simulated()))
    } else {
        return Err("no camera transport is available in this build, use --simulate".into());
    };

    let sinks = Arc::new(ZenohSinks::new(
        session.clone(),
        Handle::current(),
        args.topics(),
        args.publish_queue,
    ));
    let camera =
        tokio::task::spawn_blocking(move || Camera::open(provider.as_ref(), settings, sinks))
            .await??;

    if let Some(controller) = camera.auto_slave() {
        follow_auto_master(&session, &args.auto_topic, controller.clone()).await?;
    }

    let requests = camera.shutdown_requests();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        request = requests.as_async().recv() => {
            if let Ok(request) = request {
                warn!(?request, "camera requested shutdown");
            }
        }
    }

    tokio::task::spawn_blocking(move || camera.shutdown()).await?;
    session.close().await?;
    Ok(())
}

//! Run a supervised search node in the foreground.
//!
//! Properties come from an optional TOML file, then CLI flags override them.
//! Without a home path anywhere, `NODEWARDEN_HOME` or `~/.nodewarden` is used.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use nodewarden::config::Props;
use nodewarden::{LifecycleSupervisor, StopOutcome, constants, paths};

/// Flags of `nodewarden run`.
#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub port: Option<u16>,
    pub home: Option<PathBuf>,
    pub cluster_name: Option<String>,
    pub node_name: Option<String>,
}

impl RunOptions {
    /// Merge the config file and flags into node properties.
    pub fn into_props(self) -> Result<Props> {
        let mut props = match &self.config {
            Some(path) => Props::load_from(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => Props::new(),
        };

        if let Some(port) = self.port {
            props.set(constants::SEARCH_PORT, port.to_string());
        }
        if let Some(home) = &self.home {
            props.set(constants::PATH_HOME, home.to_string_lossy());
        }
        if let Some(cluster) = self.cluster_name {
            props.set(constants::CLUSTER_NAME, cluster);
        }
        if let Some(node) = self.node_name {
            props.set(constants::CLUSTER_NODE_NAME, node);
        }

        if props.non_blank(constants::PATH_HOME).is_none() {
            let home = paths::default_home_dir()?;
            std::fs::create_dir_all(&home)
                .with_context(|| format!("Failed to create {}", home.display()))?;
            props.set(constants::PATH_HOME, home.to_string_lossy());
        }

        Ok(props)
    }
}

/// Start the node, block until Ctrl-C, then stop it.
pub async fn execute(options: RunOptions) -> Result<()> {
    let props = options.into_props()?;
    let supervisor = Arc::new(LifecycleSupervisor::new(props)?);

    supervisor
        .start()
        .await
        .context("Failed to start search node")?;

    println!(
        "Search node ready at {} ({} backend)",
        supervisor.address().unwrap_or_default(),
        supervisor.backend_name()
    );
    println!("Press Ctrl+C to stop");

    let hook = supervisor.stop_on(async {
        let _ = tokio::signal::ctrl_c().await;
    });
    supervisor.await_stop().await;

    match hook.await.context("Shutdown hook panicked")? {
        StopOutcome::Forced(warning) => eprintln!("Warning: {warning}"),
        _ => println!("Search node stopped"),
    }
    Ok(())
}

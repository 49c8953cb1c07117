//! Print the log of a pod container

use anyhow::{Context, Result};
use std::path::Path;

use super::Session;
use crate::config::settings::Settings;

pub struct LogsArgs<'a> {
    pub pod: &'a str,
    pub container: Option<&'a str>,
    pub tail: Option<u32>,
    pub namespace: Option<&'a str>,
    pub kubeconfig: Option<&'a Path>,
}

/// Handle the logs command
pub fn show(args: LogsArgs<'_>, settings: &Settings) -> Result<()> {
    let session = Session::open(args.kubeconfig, settings, false)?;
    let namespace = session.namespace(args.namespace, settings)?;
    let log = session
        .api
        .read_pod_log(args.pod, &namespace, args.container, args.tail)
        .with_context(|| format!("Failed to read log of pod {}/{}", namespace, args.pod))?;
    print!("{}", log);
    Ok(())
}

use crate::cpu::CpuProfile;
use crate::{CdpSession, Result};
use serde_json::{Map, Value};

pub async fn enable_profiler(session: &CdpSession) -> Result<()> {
    session.send("Profiler.enable", None).await?;
    Ok(())
}

pub async fn start_profiling(session: &CdpSession) -> Result<()> {
    enable_profiler(session).await?;
    session.send("Profiler.start", None).await?;
    tracing::info!("CPU profiling started");
    Ok(())
}

/// Stops the profiler and returns the raw `profile` object, or an empty
/// object when the runtime reported none.
pub async fn stop_profiling(session: &CdpSession) -> Result<Value> {
    let mut result = session.send("Profiler.stop", None).await?;
    let profile = match result.get_mut("profile") {
        Some(profile) => profile.take(),
        None => Value::Object(Map::new()),
    };
    tracing::info!("CPU profiling stopped");
    Ok(profile)
}

pub async fn stop_and_parse(session: &CdpSession) -> Result<CpuProfile> {
    CpuProfile::from_value(stop_profiling(session).await?)
}

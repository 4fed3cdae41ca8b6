//! Synchronous facade over [`CdpSession`] and the [`ops`](crate::ops) commands.
//!
//! Owns a small tokio runtime whose worker keeps the receive loop running
//! between calls. Event callbacks run on the runtime's blocking pool, never on
//! that worker. Must not be created, used, or dropped from inside an async
//! context.

use crate::cpu::CpuProfile;
use crate::events::SubscriptionId;
use crate::heap::HeapSnapshot;
use crate::ops::{debugger, heap, profiler};
use crate::protocol::{RuntimeKind, TargetDescriptor};
use crate::session::SessionState;
use crate::types::{Breakpoint, PauseOnExceptions, PropertyDescriptor};
use crate::{CdpConfig, CdpSession, Result};
use serde_json::Value;
use std::collections::HashMap;
use tokio::runtime::Runtime;

pub struct BlockingCdpSession {
    runtime: Runtime,
    session: CdpSession,
}

fn build_runtime() -> Result<Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("cdp-blocking")
        .enable_all()
        .build()?)
}

impl BlockingCdpSession {
    pub fn connect(config: CdpConfig) -> Result<Self> {
        let runtime = build_runtime()?;
        let session = runtime.block_on(CdpSession::connect(config))?;
        Ok(Self { runtime, session })
    }

    pub fn connect_to(ws_url: &str, config: CdpConfig) -> Result<Self> {
        let runtime = build_runtime()?;
        let session = runtime.block_on(CdpSession::connect_to(ws_url, config))?;
        Ok(Self { runtime, session })
    }

    /// The underlying async session.
    pub fn session(&self) -> &CdpSession {
        &self.session
    }

    pub fn send(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.runtime.block_on(self.session.send(method, params))
    }

    pub fn subscribe<F>(&self, method: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.session.subscribe(method, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.session.unsubscribe(id)
    }

    pub fn is_paused(&self) -> bool {
        self.runtime.block_on(self.session.is_paused())
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn runtime_kind(&self) -> RuntimeKind {
        self.session.runtime_kind()
    }

    pub fn target(&self) -> Option<&TargetDescriptor> {
        self.session.target()
    }

    pub fn config(&self) -> &CdpConfig {
        self.session.config()
    }

    pub fn close(&self) {
        self.runtime.block_on(self.session.close());
    }

    pub fn enable_debugger(&self) -> Result<()> {
        self.runtime.block_on(debugger::enable_debugger(&self.session))
    }

    pub fn disable_debugger(&self) -> Result<()> {
        self.runtime.block_on(debugger::disable_debugger(&self.session))
    }

    pub fn set_breakpoint(
        &self,
        url: &str,
        line: u32,
        column: u32,
        condition: Option<&str>,
    ) -> Result<Breakpoint> {
        self.runtime.block_on(debugger::set_breakpoint(
            &self.session,
            url,
            line,
            column,
            condition,
        ))
    }

    pub fn set_breakpoint_by_url(
        &self,
        url_regex: &str,
        line: u32,
        column: u32,
        condition: Option<&str>,
    ) -> Result<String> {
        self.runtime.block_on(debugger::set_breakpoint_by_url(
            &self.session,
            url_regex,
            line,
            column,
            condition,
        ))
    }

    pub fn remove_breakpoint(&self, breakpoint_id: &str) -> Result<()> {
        self.runtime
            .block_on(debugger::remove_breakpoint(&self.session, breakpoint_id))
    }

    pub fn pause(&self) -> Result<()> {
        self.runtime.block_on(debugger::pause(&self.session))
    }

    pub fn resume(&self) -> Result<()> {
        self.runtime.block_on(debugger::resume(&self.session))
    }

    pub fn step_over(&self) -> Result<()> {
        self.runtime.block_on(debugger::step_over(&self.session))
    }

    pub fn step_into(&self) -> Result<()> {
        self.runtime.block_on(debugger::step_into(&self.session))
    }

    pub fn step_out(&self) -> Result<()> {
        self.runtime.block_on(debugger::step_out(&self.session))
    }

    pub fn set_pause_on_exceptions(&self, state: PauseOnExceptions) -> Result<()> {
        self.runtime
            .block_on(debugger::set_pause_on_exceptions(&self.session, state))
    }

    pub fn get_call_frames(&self) -> Vec<Value> {
        self.runtime.block_on(debugger::get_call_frames(&self.session))
    }

    pub fn evaluate(
        &self,
        expression: &str,
        call_frame_id: Option<&str>,
        context_id: Option<i64>,
    ) -> Result<Value> {
        self.runtime.block_on(debugger::evaluate(
            &self.session,
            expression,
            call_frame_id,
            context_id,
        ))
    }

    pub fn get_properties(&self, object_id: &str) -> Result<Vec<PropertyDescriptor>> {
        self.runtime
            .block_on(debugger::get_properties(&self.session, object_id))
    }

    pub fn get_scope_variables(&self, call_frame_id: &str) -> Result<HashMap<String, Value>> {
        self.runtime
            .block_on(debugger::get_scope_variables(&self.session, call_frame_id))
    }

    pub fn enable_heap_profiler(&self) -> Result<()> {
        self.runtime.block_on(heap::enable_heap_profiler(&self.session))
    }

    pub fn take_heap_snapshot(&self, report_progress: bool) -> Result<String> {
        self.runtime
            .block_on(heap::take_heap_snapshot(&self.session, report_progress))
    }

    pub fn capture_snapshot(&self, report_progress: bool) -> Result<Option<HeapSnapshot>> {
        self.runtime
            .block_on(heap::capture_snapshot(&self.session, report_progress))
    }

    pub fn enable_profiler(&self) -> Result<()> {
        self.runtime.block_on(profiler::enable_profiler(&self.session))
    }

    pub fn start_profiling(&self) -> Result<()> {
        self.runtime.block_on(profiler::start_profiling(&self.session))
    }

    pub fn stop_profiling(&self) -> Result<Value> {
        self.runtime.block_on(profiler::stop_profiling(&self.session))
    }

    pub fn stop_and_parse(&self) -> Result<CpuProfile> {
        self.runtime.block_on(profiler::stop_and_parse(&self.session))
    }
}

impl Drop for BlockingCdpSession {
    fn drop(&mut self) {
        self.runtime.block_on(self.session.close());
    }
}

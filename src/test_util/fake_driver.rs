use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use async_trait::async_trait;
use rustc_hash::FxHashSet;
use uuid::Uuid;

use crate::platform::{LinkEvent, LinkEventSink, LinkHandle, PeerId, PlatformDriver};

/// a driver call as recorded by [FakeDriver]
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DriverCall {
    StartScan,
    StopScan,
    Connect(PeerId),
    DiscoverServices(LinkHandle),
    SetNotification { link: LinkHandle, enable: bool },
    Disconnect(LinkHandle),
    Refresh(LinkHandle),
    Release(LinkHandle),
}

#[derive(Default)]
struct FakeDriverState {
    sink: Option<LinkEventSink>,
    next_handle: u64,
    calls: Vec<DriverCall>,
    written: Vec<(LinkHandle, Vec<u8>)>,
    write_script: VecDeque<bool>,
    fail_all_writes: bool,
    auto_establish: bool,
    failing_connects: usize,
    fail_notifications: bool,
    failing_releases: FxHashSet<LinkHandle>,
}

/// A scripted [PlatformDriver] that records every call. Link handles are numbered from 1 in the
///  order in which connections are initiated.
///
/// With `auto_establish`, the fake reports every initiated connection as established and every
///  service discovery as successful, which takes a session to `Ready` without further
///  interaction. Other link events are injected through [FakeDriver::emit].
pub struct FakeDriver {
    state: Mutex<FakeDriverState>,
}
impl Default for FakeDriver {
    fn default() -> Self {
        FakeDriver::new()
    }
}
impl FakeDriver {
    pub fn new() -> FakeDriver {
        FakeDriver {
            state: Mutex::new(FakeDriverState {
                next_handle: 1,
                ..Default::default()
            }),
        }
    }

    pub fn with_auto_establish() -> FakeDriver {
        let result = FakeDriver::new();
        result.set_auto_establish(true);
        result
    }

    fn state(&self) -> MutexGuard<'_, FakeDriverState> {
        self.state.lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_auto_establish(&self, value: bool) {
        self.state().auto_establish = value;
    }

    /// results of upcoming writes, writes beyond the script succeed
    pub fn script_writes(&self, results: Vec<bool>) {
        self.state().write_script = results.into();
    }

    pub fn fail_all_writes(&self, value: bool) {
        self.state().fail_all_writes = value;
    }

    pub fn fail_next_connects(&self, num: usize) {
        self.state().failing_connects = num;
    }

    pub fn fail_notifications(&self, value: bool) {
        self.state().fail_notifications = value;
    }

    pub fn fail_release_of(&self, link: LinkHandle) {
        self.state().failing_releases.insert(link);
    }

    /// posts a link event the way the platform would, from outside the coordinating task
    pub fn emit(&self, event: LinkEvent) {
        let sink = self.state().sink.clone();
        match sink {
            Some(sink) => sink.post(event),
            None => panic!("driver was not attached to a session"),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.state().sink.is_some()
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.state().calls.clone()
    }

    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        self.state().written.iter()
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    pub fn written_to(&self, link: LinkHandle) -> Vec<Vec<u8>> {
        self.state().written.iter()
            .filter(|(l, _)| *l == link)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    pub fn num_connects(&self) -> usize {
        self.state().calls.iter()
            .filter(|c| matches!(c, DriverCall::Connect(_)))
            .count()
    }

    /// handles for which `release` was called, in call order
    pub fn released(&self) -> Vec<LinkHandle> {
        self.state().calls.iter()
            .filter_map(|c| match c {
                DriverCall::Release(link) => Some(*link),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: DriverCall) {
        self.state().calls.push(call);
    }
}

#[async_trait]
impl PlatformDriver for FakeDriver {
    fn attach(&self, sink: LinkEventSink) {
        self.state().sink = Some(sink);
    }

    async fn start_scan(&self) -> anyhow::Result<()> {
        self.record(DriverCall::StartScan);
        Ok(())
    }

    async fn stop_scan(&self) {
        self.record(DriverCall::StopScan);
    }

    async fn connect(&self, peer: &PeerId) -> anyhow::Result<LinkHandle> {
        let (link, auto_establish) = {
            let mut state = self.state();
            state.calls.push(DriverCall::Connect(peer.clone()));
            if state.failing_connects > 0 {
                state.failing_connects -= 1;
                return Err(anyhow!("connection to {} refused", peer));
            }
            let link = LinkHandle(state.next_handle);
            state.next_handle += 1;
            (link, state.auto_establish)
        };

        if auto_establish {
            self.emit(LinkEvent::LinkConnected(link));
        }
        Ok(link)
    }

    async fn discover_services(&self, link: LinkHandle) -> anyhow::Result<()> {
        self.record(DriverCall::DiscoverServices(link));
        if self.state().auto_establish {
            self.emit(LinkEvent::ServicesDiscovered { link, success: true });
        }
        Ok(())
    }

    async fn set_notification(&self, link: LinkHandle, _service: Uuid, _characteristic: Uuid, enable: bool) -> anyhow::Result<()> {
        let fail = {
            let mut state = self.state();
            state.calls.push(DriverCall::SetNotification { link, enable });
            state.fail_notifications
        };
        if fail {
            return Err(anyhow!("characteristic not found"));
        }
        Ok(())
    }

    async fn write(&self, link: LinkHandle, _service: Uuid, _characteristic: Uuid, frame: &[u8]) -> bool {
        let mut state = self.state();
        state.written.push((link, frame.to_vec()));
        if state.fail_all_writes {
            return false;
        }
        state.write_script.pop_front()
            .unwrap_or(true)
    }

    async fn disconnect(&self, link: LinkHandle) -> anyhow::Result<()> {
        self.record(DriverCall::Disconnect(link));
        Ok(())
    }

    async fn release(&self, link: LinkHandle) -> anyhow::Result<()> {
        let fail = {
            let mut state = self.state();
            state.calls.push(DriverCall::Release(link));
            state.failing_releases.contains(&link)
        };
        if fail {
            return Err(anyhow!("platform refused to release {:?}", link));
        }
        Ok(())
    }

    async fn try_refresh(&self, link: LinkHandle) -> bool {
        self.record(DriverCall::Refresh(link));
        true
    }
}

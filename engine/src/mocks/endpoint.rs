use super::GATEWAY;
use crate::upload::{Endpoint as EndpointTrait, Reply, Request};
use serde_json::{json, Value};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

#[derive(Default)]
struct State {
    queued: VecDeque<Result<Reply, String>>,
    requests: Vec<Request>,
    stored: u64,
}

/// An in-memory upload service.
///
/// Replies queued with [Endpoint::reply] or [Endpoint::unreachable] are returned in order;
/// once the queue is empty every upload succeeds with a fresh gateway URL.
#[derive(Clone, Default)]
pub struct Endpoint {
    state: Arc<Mutex<State>>,
}

impl Endpoint {
    /// Queue a reply with `status` and `body`.
    pub fn reply(&self, status: u16, body: Value) {
        self.state
            .lock()
            .unwrap()
            .queued
            .push_back(Ok(Reply { status, body }));
    }

    /// Queue a transport failure.
    pub fn unreachable(&self, message: &str) {
        self.state
            .lock()
            .unwrap()
            .queued
            .push_back(Err(message.to_string()));
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().unwrap().requests.clone()
    }
}

impl EndpointTrait for Endpoint {
    async fn post(&self, request: Request) -> Result<Reply, String> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request);
        if let Some(queued) = state.queued.pop_front() {
            return queued;
        }
        state.stored += 1;
        Ok(Reply {
            status: 200,
            body: json!({"url": format!("{GATEWAY}Qm{:044}", state.stored)}),
        })
    }
}

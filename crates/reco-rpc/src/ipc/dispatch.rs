//! Inbound handling of calls, responses and events.
//!
//! Call handling order:
//! 1. Resolve the function by name; unknown ⇒ `"unknown function"`
//! 2. Authorize the sender; denied ⇒ `"Permission denied"`
//! 3. Run the bound handler; errors and panics become failure responses
//! 4. Reply directly to the calling node
//!
//! Each call runs on its own task, bounded by the manager's permits.

use crate::domain::correlation::CallId;
use crate::domain::error::{RemoteError, PERMISSION_DENIED, UNKNOWN_FUNCTION};
use crate::domain::function::CallInfo;
use crate::ipc::wire::{CallRequest, CallResponse, EventCall};
use crate::manager::RpcManager;
use futures::FutureExt;
use reco_bus::{BusResult, Channel, Message, NamedPayload};
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Listener for `rpcivk`.
pub(crate) fn on_call(manager: &Arc<RpcManager>, message: &Message) {
    let request: CallRequest = match message.decode() {
        Ok(request) => request,
        Err(e) => {
            warn!(source = ?message.source(), error = %e, "Malformed call dropped");
            return;
        }
    };

    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(serve_call(manager.clone(), message.clone(), request));
        }
        Err(_) => warn!(
            call_id = %request.call_id,
            function = %request.name,
            "No async runtime to serve call, dropped"
        ),
    }
}

/// Serve one call and send its response.
pub(crate) async fn serve_call(manager: Arc<RpcManager>, message: Message, request: CallRequest) {
    let Ok(_permit) = manager.permits.clone().acquire_owned().await else {
        return;
    };

    let call_id = request.call_id;
    let reply = match reply_channel(&manager, &message) {
        Ok(channel) => channel,
        Err(e) => {
            warn!(call_id = %call_id, source = ?message.source(), error = %e, "No reply path for call, dropped");
            return;
        }
    };

    let response = respond(call_id, execute(&manager, &message, reply.clone(), request).await);

    if let Err(e) = response.to_message().and_then(|m| reply.send(m)) {
        warn!(call_id = %call_id, error = %e, "Failed to send response");
    }
}

/// Why a call produced no value.
#[derive(Debug)]
enum Failure {
    /// Refused before any handler ran.
    Rejected(&'static str),
    /// The handler failed or could not run.
    Handler(RemoteError),
}

fn respond(call_id: CallId, outcome: Result<Value, Failure>) -> CallResponse {
    match outcome {
        Ok(value) => CallResponse::success(call_id, value),
        Err(Failure::Rejected(reason)) => CallResponse::rejected(call_id, reason),
        Err(Failure::Handler(error)) => CallResponse::failure(call_id, &error),
    }
}

async fn execute(
    manager: &RpcManager,
    message: &Message,
    reply: Arc<dyn Channel>,
    request: CallRequest,
) -> Result<Value, Failure> {
    let Some(function) = manager.function(&request.name) else {
        debug!(function = %request.name, source = ?message.source(), "Call to unknown function");
        return Err(Failure::Rejected(UNKNOWN_FUNCTION));
    };

    if !manager.authorize(&function, message) {
        debug!(function = %request.name, source = ?message.source(), "Permission denied");
        return Err(Failure::Rejected(PERMISSION_DENIED));
    }

    let Some(handler) = function.handler() else {
        warn!(function = %request.name, "Call to function without local handler");
        return Err(Failure::Handler(RemoteError::new(format!(
            "no handler bound for {}",
            request.name
        ))));
    };

    let source = message.source().unwrap_or_default();
    let info = CallInfo::remote(reply, request.call_id, source);

    match AssertUnwindSafe(handler.call(info, request.args)).catch_unwind().await {
        Ok(Ok(value)) => {
            debug!(call_id = %request.call_id, function = %request.name, "Call served");
            Ok(value)
        }
        Ok(Err(e)) => {
            let error = RemoteError::from_anyhow(&e);
            warn!(
                call_id = %request.call_id,
                function = %request.name,
                error = %error,
                "Handler failed"
            );
            Err(Failure::Handler(error))
        }
        Err(panic) => {
            let error = RemoteError::new(format!("handler panicked: {}", panic_message(&*panic)));
            warn!(call_id = %request.call_id, function = %request.name, error = %error, "Handler panicked");
            Err(Failure::Handler(error))
        }
    }
}

/// The channel responses to `message` go to.
///
/// The routed channel is used when it points back at the sender; calls that
/// arrived on an aux or publish channel are answered directly.
fn reply_channel(manager: &RpcManager, message: &Message) -> BusResult<Arc<dyn Channel>> {
    let source = message.source().unwrap_or_default();
    match message.channel() {
        Some(channel) if channel.remote() == Some(source) => Ok(channel.clone()),
        _ => manager.endpoint().channel_to(source),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// Listener for `rpcres`.
pub(crate) fn on_response(manager: &Arc<RpcManager>, message: &Message) {
    match message.decode::<CallResponse>() {
        Ok(response) => {
            manager
                .exchanges()
                .complete(response.call_id, response.into_outcome());
        }
        Err(e) => warn!(source = ?message.source(), error = %e, "Malformed response dropped"),
    }
}

/// Listener for `rpcive`.
pub(crate) fn on_event(manager: &Arc<RpcManager>, message: &Message) {
    let call: EventCall = match message.decode() {
        Ok(call) => call,
        Err(e) => {
            warn!(source = ?message.source(), error = %e, "Malformed event dropped");
            return;
        }
    };

    match manager.event(&call.name) {
        Some(event) => {
            let notified = event.call(&call.payload, call.uid.as_ref());
            debug!(event = %call.name, notified = notified, "Event delivered");
        }
        None => debug!(event = %call.name, "Event not compiled on this node"),
    }
}

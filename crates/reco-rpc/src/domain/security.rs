//! Inbound call authorization.
//!
//! | Step | Rule |
//! |------|------|
//! | 1 | function allows the wildcard group: allow |
//! | 2 | sender's groups intersect the allowed groups: allow |
//! | 3 | security manager's explicit verdict |
//! | 4 | no security manager: deny |

use crate::domain::function::RemoteFunction;
use crate::manager::RpcManager;
use reco_bus::Message;
use std::collections::HashMap;

/// Pluggable source of security groups and inbound verdicts.
pub trait InboundSecurityManager: Send + Sync {
    /// Security groups of the sender of `message`.
    fn security_groups(&self, manager: &RpcManager, message: &Message) -> Vec<String>;

    /// Verdict for a call no allowed group matched.
    fn check_inbound_call(&self, manager: &RpcManager, message: &Message, groups: &[String]) -> bool {
        let _ = (manager, message, groups);
        false
    }
}

/// Decide whether the call in `message` may invoke `function`.
pub fn authorize(
    manager: &RpcManager,
    function: &RemoteFunction,
    message: &Message,
    wildcard: &str,
    security: Option<&dyn InboundSecurityManager>,
) -> bool {
    let allowed = function.allowed_groups();
    if allowed.contains(wildcard) {
        return true;
    }

    let Some(security) = security else {
        return false;
    };

    let groups = security.security_groups(manager, message);
    if groups.iter().any(|g| allowed.contains(g)) {
        return true;
    }
    security.check_inbound_call(manager, message, &groups)
}

/// Security manager with fixed groups per source node.
#[derive(Debug, Clone, Default)]
pub struct StaticSecurityManager {
    groups: HashMap<String, Vec<String>>,
    fallback: bool,
}

impl StaticSecurityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign groups to the node `source`.
    #[must_use]
    pub fn with_groups<I, S>(mut self, source: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .insert(source.into(), groups.into_iter().map(Into::into).collect());
        self
    }

    /// Verdict when no group matches.
    #[must_use]
    pub fn with_fallback(mut self, allow: bool) -> Self {
        self.fallback = allow;
        self
    }
}

impl InboundSecurityManager for StaticSecurityManager {
    fn security_groups(&self, _manager: &RpcManager, message: &Message) -> Vec<String> {
        message
            .source()
            .and_then(|source| self.groups.get(source))
            .cloned()
            .unwrap_or_default()
    }

    fn check_inbound_call(&self, _manager: &RpcManager, _message: &Message, _groups: &[String]) -> bool {
        self.fallback
    }
}

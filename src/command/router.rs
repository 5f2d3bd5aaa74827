//! Command router - maps an inbound (topic, payload) to a bound handler

use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};
use tracker_shared::{FrameworkError, FrameworkResult, Qos};

use super::params::tokenize;

/// Handler invoked with the command's tokens, command name at index 0
pub type CommandHandler = Arc<dyn Fn(&[String]) -> FrameworkResult + Send + Sync>;

/// A command name and the handler it dispatches to
#[derive(Clone)]
pub struct CommandBinding {
    pub name: &'static str,
    pub handler: CommandHandler,
}

impl CommandBinding {
    pub fn new(
        name: &'static str,
        handler: impl Fn(&[String]) -> FrameworkResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            handler: Arc::new(handler),
        }
    }
}

impl fmt::Debug for CommandBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A subscribed topic and the commands accepted on it
#[derive(Debug, Clone)]
pub struct TopicBinding {
    pub topic: String,
    pub qos: Qos,
    pub commands: Vec<CommandBinding>,
}

impl TopicBinding {
    pub fn new(topic: impl Into<String>, qos: Qos, commands: Vec<CommandBinding>) -> Self {
        Self {
            topic: topic.into(),
            qos,
            commands,
        }
    }

    pub fn command_names(&self) -> Vec<&'static str> {
        self.commands.iter().map(|c| c.name).collect()
    }

    fn find(&self, name: &str) -> Option<&CommandBinding> {
        self.commands.iter().find(|c| c.name == name)
    }
}

/// Table of topic bindings with exact-match routing
///
/// Bindings are added once their subscription succeeds and are not modified
/// afterwards; routing takes a snapshot of the matched binding and runs the
/// handler without holding the table lock.
#[derive(Default)]
pub struct CommandRouter {
    bindings: RwLock<Vec<Arc<TopicBinding>>>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding, replacing any earlier binding for the same topic
    pub fn register(&self, binding: TopicBinding) {
        let mut bindings = self.bindings.write().unwrap_or_else(|p| p.into_inner());
        bindings.retain(|b| b.topic != binding.topic);
        debug!("routing {} -> {:?}", binding.topic, binding.command_names());
        bindings.push(Arc::new(binding));
    }

    /// Snapshot of every registered binding
    pub fn bindings(&self) -> Vec<Arc<TopicBinding>> {
        self.bindings
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn is_bound(&self, topic: &str) -> bool {
        self.lookup(topic).is_some()
    }

    pub fn clear(&self) {
        self.bindings
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }

    fn lookup(&self, topic: &str) -> Option<Arc<TopicBinding>> {
        self.bindings
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .find(|b| b.topic == topic)
            .cloned()
    }

    /// Parse `payload` and invoke the matching handler bound on `topic`
    ///
    /// Unknown topics and command names are `NotFound`; handler errors are
    /// passed back. Every failure is logged and none is fatal to the router.
    pub fn route(&self, topic: &str, payload: &str) -> FrameworkResult {
        let Some(binding) = self.lookup(topic) else {
            warn!("no binding for topic {}", topic);
            return Err(FrameworkError::not_found(format!("topic {}", topic)));
        };

        let tokens = tokenize(payload);
        let Some(name) = tokens.first() else {
            warn!("empty command on {}", topic);
            return Err(FrameworkError::validation(format!("empty command on {}", topic)));
        };

        let Some(command) = binding.find(name) else {
            warn!("unknown command {} on {}", name, topic);
            return Err(FrameworkError::not_found(format!("command {} on {}", name, topic)));
        };

        info!("{} {:?}", topic, tokens);
        let result = (command.handler)(&tokens);
        match &result {
            Ok(()) => debug!("{} handled", name),
            Err(FrameworkError::Validation(reason)) => warn!("{} rejected: {}", name, reason),
            Err(e) => warn!("{} failed: {}", name, e),
        }
        result
    }
}

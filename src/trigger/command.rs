//! Trigger command parsing
//!
//! Each console line outside a running workflow is one trigger.

/// What a trigger line asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerCommand {
    /// Start the delete-user workflow
    Delete,
    /// Start the update-profile workflow with a new display name
    Update { new_name: String },
    /// Ask the capability server whether it is alive
    Health,
    /// Show enrolled users
    List,
    /// Exit the daemon
    Quit,
}

impl TriggerCommand {
    /// Parse a console line; `None` for blank or unknown input
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb.to_lowercase().as_str() {
            "delete" | "forget" if rest.is_empty() => Some(Self::Delete),
            "update" | "rename" if !rest.is_empty() => Some(Self::Update {
                new_name: rest.to_string(),
            }),
            "health" | "status" if rest.is_empty() => Some(Self::Health),
            "list" | "users" if rest.is_empty() => Some(Self::List),
            "quit" | "exit" if rest.is_empty() => Some(Self::Quit),
            _ => None,
        }
    }

    /// Whether this trigger starts a voice workflow
    pub fn is_workflow(&self) -> bool {
        matches!(self, Self::Delete | Self::Update { .. })
    }
}

/// Help text listing the trigger lines
pub const USAGE: &str = "commands: delete | update <new name> | health | list | quit";

use std::sync::Arc;

use anyhow::Result;
use nimbus_access::AccessControlStore;
use tracing::info;

const DENIAL_REPLY: &str = "You are not allowed to use this command.";
const USAGE_REPLY: &str =
    "Unrecognized command. Use block <id>, unblock <id>, list-blocked or help.";
const HELP_REPLY: &str = "Available commands:\n\
block <id> - block a user\n\
unblock <id> - unblock a user\n\
list-blocked - list blocked users";

const COMMAND_VOCABULARY: [&str; 4] = ["block", "unblock", "list-blocked", "help"];

/// In-band administrative command dispatch.
///
/// Single-action: there is no session and no capture. Non-admins get a fixed
/// denial and no state changes; a recognized command takes exactly one
/// whitespace-delimited argument.
pub struct AdminCommands {
    access: Arc<AccessControlStore>,
}

impl AdminCommands {
    pub fn new(access: Arc<AccessControlStore>) -> Self {
        Self { access }
    }

    pub fn matches(&self, text: &str) -> bool {
        let Some(first_token) = text.split_whitespace().next() else {
            return false;
        };
        let normalized = first_token.to_ascii_lowercase();
        COMMAND_VOCABULARY.iter().any(|command| *command == normalized)
    }

    /// Runs one command from `sender_id` and returns the reply text.
    /// Persistence failures propagate; everything else is a fixed reply.
    pub fn dispatch(&self, sender_id: &str, text: &str) -> Result<String> {
        if !self.access.is_admin(sender_id) {
            return Ok(DENIAL_REPLY.to_string());
        }

        let mut tokens = text.split_whitespace();
        let command = tokens.next().unwrap_or_default().to_ascii_lowercase();
        let argument = tokens.next();

        match (command.as_str(), argument) {
            ("block", Some(target)) => {
                self.access.block(target)?;
                info!(admin = sender_id, target, "admin blocked user");
                Ok(format!("User {target} has been blocked."))
            }
            ("unblock", Some(target)) => {
                self.access.unblock(target)?;
                info!(admin = sender_id, target, "admin unblocked user");
                Ok(format!("User {target} has been unblocked."))
            }
            ("list-blocked", _) => {
                let blocked = self.access.blocked_ids();
                if blocked.is_empty() {
                    Ok("No blocked users.".to_string())
                } else {
                    Ok(format!("Blocked users:\n{}", blocked.join("\n")))
                }
            }
            ("help", _) => Ok(HELP_REPLY.to_string()),
            _ => Ok(USAGE_REPLY.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands(dir: &tempfile::TempDir) -> AdminCommands {
        let store = AccessControlStore::load(
            dir.path().join("access.json"),
            ["admin-1".to_string()],
        )
        .expect("load store");
        AdminCommands::new(Arc::new(store))
    }

    #[test]
    fn non_admin_gets_denial_and_no_mutation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let admin = commands(&dir);
        let reply = admin.dispatch("user-1", "block user-2").expect("dispatch");
        assert_eq!(reply, DENIAL_REPLY);
        assert!(!admin.access.is_blocked("user-2"));
    }

    #[test]
    fn admin_block_and_unblock_mutate_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let admin = commands(&dir);

        let reply = admin.dispatch("admin-1", "block user-2").expect("dispatch");
        assert_eq!(reply, "User user-2 has been blocked.");
        assert!(admin.access.is_blocked("user-2"));

        let reply = admin
            .dispatch("admin-1", "unblock user-2")
            .expect("dispatch");
        assert_eq!(reply, "User user-2 has been unblocked.");
        assert!(!admin.access.is_blocked("user-2"));
    }

    #[test]
    fn list_blocked_reports_current_blocklist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let admin = commands(&dir);
        assert_eq!(
            admin.dispatch("admin-1", "list-blocked").expect("dispatch"),
            "No blocked users."
        );
        admin.dispatch("admin-1", "block user-2").expect("dispatch");
        admin.dispatch("admin-1", "block user-3").expect("dispatch");
        assert_eq!(
            admin.dispatch("admin-1", "list-blocked").expect("dispatch"),
            "Blocked users:\nuser-2\nuser-3"
        );
    }

    #[test]
    fn missing_argument_yields_usage_without_state_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        let admin = commands(&dir);
        assert_eq!(admin.dispatch("admin-1", "block").expect("dispatch"), USAGE_REPLY);
        assert!(admin.access.blocked_ids().is_empty());
    }

    #[test]
    fn help_lists_the_vocabulary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let admin = commands(&dir);
        let reply = admin.dispatch("admin-1", "help").expect("dispatch");
        assert!(reply.contains("block <id>"));
        assert!(reply.contains("list-blocked"));
    }

    #[test]
    fn matches_only_the_command_vocabulary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let admin = commands(&dir);
        assert!(admin.matches("block user-2"));
        assert!(admin.matches("HELP"));
        assert!(!admin.matches("hello there"));
        assert!(!admin.matches(""));
    }
}

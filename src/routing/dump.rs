//! Human-readable route and handler listings for the CLI.

use std::fmt::Write;

use crate::routing::registry::RouterRegistry;

impl RouterRegistry {
    /// One line per route in match order: pattern, params, handler name.
    pub fn dump_routes(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<60} | {}", "Route", "Handler");
        let _ = writeln!(out, "{}", "-".repeat(80));
        for route in self.routes() {
            let pattern = format!(
                "{}({})",
                route.path().pattern(),
                route.path().params().join(";")
            );
            let _ = writeln!(out, "{:<60} | {}", pattern, route.handler_name());
        }
        out
    }

    /// One line per handler name: which actions are registered.
    pub fn dump_handlers(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<30} | {}", "Handler", "Actions");
        let _ = writeln!(out, "{}", "-".repeat(80));
        for name in self.handler_names() {
            let Some(actions) = self.actions(name) else {
                continue;
            };
            let mut registered = Vec::new();
            if actions.data().is_some() {
                registered.push("DATA".to_string());
            }
            if actions.any().is_some() {
                registered.push("ANY".to_string());
            }
            registered.extend(actions.methods().into_iter().map(|m| m.to_string()));
            let _ = writeln!(out, "{:<30} | {}", name, registered.join(" ; "));
        }
        out
    }
}

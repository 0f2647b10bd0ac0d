use crate::domain::models::PolicyProfile;
use console::style;
use std::fmt::Write as _;

pub fn render_policy_profile(profile: &PolicyProfile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} v{}", style(&profile.name).bold(), profile.version);
    let _ = writeln!(out, "├─ sandbox_tier: {:?}", profile.sandbox_tier);
    let _ = writeln!(out, "├─ safety_multiplier: {}", profile.safety_multiplier);
    let _ = writeln!(out, "├─ per_call_cost_ceiling: {:.4}", profile.per_call_cost_ceiling);
    let _ = writeln!(out, "├─ per_task_cost_ceiling: {:.4}", profile.per_task_cost_ceiling);
    let _ = writeln!(out, "├─ command_allow_patterns:");
    for (i, pattern) in profile.command_allow_patterns.iter().enumerate() {
        let branch = if i + 1 == profile.command_allow_patterns.len() { "└─" } else { "├─" };
        let _ = writeln!(out, "│  {branch} {pattern}");
    }
    let _ = writeln!(out, "├─ write_scope: {}", profile.write_scope.join(", "));
    let _ = write!(out, "└─ egress_allow_list:");
    if profile.egress_allow_list.is_empty() {
        let _ = write!(out, " (none)");
    } else {
        for host in &profile.egress_allow_list {
            let _ = write!(out, "\n   - {host}");
        }
    }
    out
}

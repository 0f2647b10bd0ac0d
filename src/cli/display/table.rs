use crate::domain::models::Task;
use crate::services::agent_adapter::AdapterRegistry;
use comfy_table::{Cell, Table};
use console::style;

pub fn render_task_status(task: &Task) -> String {
    let mut table = Table::new();
    table.set_header(vec!["field", "value"]);
    table.add_row(vec!["id".to_string(), task.id.clone()]);
    table.add_row(vec!["status".to_string(), style(task.status.as_str()).bold().to_string()]);
    table.add_row(vec!["mode".to_string(), task.mode.as_str().to_string()]);
    table.add_row(vec!["goal".to_string(), task.goal.clone()]);
    table.add_row(vec!["iterations".to_string(), format!("{}/{}", task.spent.iterations, task.budgets.max_iterations)]);
    table.add_row(vec!["cost_usd".to_string(), format!("{:.4}/{:.4}", task.spent.cost_usd, task.budgets.cost_usd)]);
    table.to_string()
}

pub fn render_task_list(tasks: &[Task]) -> String {
    let mut table = Table::new();
    table.set_header(vec!["id", "status", "mode", "priority", "iterations"]);
    for task in tasks {
        table.add_row(vec![
            Cell::new(&task.id),
            Cell::new(task.status.as_str()),
            Cell::new(task.mode.as_str()),
            Cell::new(task.priority),
            Cell::new(format!("{}/{}", task.spent.iterations, task.budgets.max_iterations)),
        ]);
    }
    table.to_string()
}

pub fn render_adapter_list(registry: &AdapterRegistry) -> String {
    let mut table = Table::new();
    table.set_header(vec!["id", "execution_model", "capabilities"]);
    for descriptor in registry.descriptors() {
        let caps = descriptor.capabilities.iter().map(|c| format!("{c:?}")).collect::<Vec<_>>().join(", ");
        table.add_row(vec![descriptor.id.clone(), format!("{:?}", descriptor.execution_model), caps]);
    }
    table.to_string()
}

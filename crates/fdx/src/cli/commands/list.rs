//! Implementation of `fdx list`.

use std::process::ExitCode;

use comfy_table::{Cell, CellAlignment, Table, presets::UTF8_FULL_CONDENSED};

use crate::cli::{
    context::CommandContext,
    output::{dim, format_time},
};

/// Lists indexed roots with their entry counts and freshness.
pub fn run(ctx: &CommandContext) -> ExitCode {
    let roots = ctx.registry.list();
    if roots.is_empty() {
        println!("{}", dim("No indexed directories."));
        println!("Run 'fdx index <dir>' to create one.");
        return ExitCode::SUCCESS;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Root", "Entries", "Last scan", "Status"]);
    for root in &roots {
        let status = match ctx.effective_settings(root) {
            Ok(settings) => root.status(&settings).description(),
            Err(code) => return code,
        };
        let scanned = root
            .last_full_scan_time
            .map_or_else(|| "never".to_string(), format_time);
        table.add_row(vec![
            Cell::new(root.root_path.display()),
            Cell::new(root.entry_count).set_alignment(CellAlignment::Right),
            Cell::new(scanned),
            Cell::new(status),
        ]);
    }
    println!("{table}");
    ExitCode::SUCCESS
}

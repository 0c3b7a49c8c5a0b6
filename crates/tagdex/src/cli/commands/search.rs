//! Implementation of `tagdex search`.

use std::process::ExitCode;

use tagdex_engine::{SearchParams, Services};

use crate::cli::{
    args::SearchCommand,
    context::CommandContext,
    output::{print_json, records_table},
};

/// Searches the index and prints one page of matching records.
pub async fn run(ctx: &CommandContext, cmd: &SearchCommand) -> ExitCode {
    let services = match ctx.services() {
        Ok(services) => services,
        Err(code) => return code,
    };

    let params = SearchParams {
        query: cmd.query.join(" "),
        limit: cmd.limit,
        page: cmd.page,
        cursor: cmd.cursor.clone(),
        reverse: cmd.reverse,
        exclude_ids: cmd.exclude_ids.clone(),
        exclude_hashes: cmd.exclude_hashes.clone(),
    };

    if cmd.explain {
        return explain(&services, &params).await;
    }

    let page = match services.search.respond(&params).await {
        Ok(page) => page,
        Err(e) => {
            eprintln!("error: search failed: {}", e.message);
            return ExitCode::FAILURE;
        }
    };

    if cmd.json {
        return print_json(&page);
    }
    if page.records.is_empty() {
        println!("No records found.");
        return ExitCode::SUCCESS;
    }

    println!("{}", records_table(&page.records));
    if let Some(cursor) = &page.next_cursor {
        println!("Next page: --cursor {cursor}");
    }
    ExitCode::SUCCESS
}

/// Prints each stage of query processing.
async fn explain(services: &Services, params: &SearchParams) -> ExitCode {
    let explanation = match services.search.explain(params).await {
        Ok(explanation) => explanation,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let sections = [
        ("Query:", params.query.as_str()),
        ("Parsed:", explanation.parsed.as_str()),
        ("Compiled:", explanation.compiled.as_str()),
        ("Order:", explanation.plan.as_str()),
    ];
    for (title, body) in sections {
        println!("{title}");
        for line in body.lines() {
            println!("   {line}");
        }
        println!();
    }
    ExitCode::SUCCESS
}

//! Implementation of `tagdex tags`.

use std::process::ExitCode;

use tagdex_engine::{Relation, Services};

use crate::cli::{
    args::TagsCommand,
    context::CommandContext,
    output::{name_list, print_json, tags_table},
};

/// Looks tags up and prints them with the requested relationships.
pub async fn run(ctx: &CommandContext, cmd: &TagsCommand) -> ExitCode {
    let services = match ctx.services() {
        Ok(services) => services,
        Err(code) => return code,
    };

    if cmd.all_parents {
        return ancestors(&services, cmd).await;
    }
    if cmd.parents || cmd.children {
        return relationships(&services, cmd).await;
    }

    let found = match services.tags.lookup(&cmd.names).await {
        Ok(found) => found,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if cmd.json {
        return print_json(&found);
    }
    if found.is_empty() {
        println!("No tags found.");
    } else {
        println!("{}", tags_table(&found));
    }
    ExitCode::SUCCESS
}

/// Prints direct parents and/or children per name.
async fn relationships(services: &Services, cmd: &TagsCommand) -> ExitCode {
    let include: Vec<Relation> = [
        (cmd.parents, Relation::Parents),
        (cmd.children, Relation::Children),
    ]
    .into_iter()
    .filter_map(|(wanted, relation)| wanted.then_some(relation))
    .collect();

    let found = match services.tags.relationships(&cmd.names, &include).await {
        Ok(found) => found,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if cmd.json {
        return print_json(&found);
    }
    if found.is_empty() {
        println!("No tags found.");
    }
    for (name, relations) in &found {
        println!("{name} -> {} ({})", relations.tag.name, relations.tag.category.name());
        if let Some(parents) = &relations.parents {
            println!("   parents:  {}", name_list(parents));
        }
        if let Some(children) = &relations.children {
            println!("   children: {}", name_list(children));
        }
    }
    ExitCode::SUCCESS
}

/// Prints every ancestor per name.
async fn ancestors(services: &Services, cmd: &TagsCommand) -> ExitCode {
    let found = match services.tags.all_parents(&cmd.names).await {
        Ok(found) => found,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if cmd.json {
        return print_json(&found);
    }
    if found.is_empty() {
        println!("No tags found.");
    }
    for (name, parents) in &found {
        println!("{name}: {}", name_list(parents));
    }
    ExitCode::SUCCESS
}

//! Command dispatch: one function per subcommand

use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::CommandFactory;
use clap_complete::generate;
use itertools::Itertools;
use tracing::{debug, instrument};

use crate::cli::args::{
    Cli, Commands, ComponentCommands, ConfigCommands, NodeCommands, NodeRef, ParsetCommands,
    TemplateCommands, TreeCommands,
};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, store_config_path, Settings};
use crate::domain::{LeafValue, Node, NodeId, NodeKind, TreeId, TreeInfo, ROOT_PARENT};
use crate::infrastructure::ServiceContainer;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let Some(command) = &cli.command else {
        return Ok(());
    };

    match command {
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Commands::Config { command } => cmd_config(cli, command),
        _ => {
            let ctx = ServiceContainer::new(load_settings(cli)?)?;
            match command {
                Commands::Component { command } => cmd_component(&ctx, command),
                Commands::Template { command } => cmd_template(&ctx, command),
                Commands::Instantiate { template } => cmd_instantiate(&ctx, *template),
                Commands::Tree { command } => cmd_tree(&ctx, command),
                Commands::Node { command } => cmd_node(&ctx, command),
                Commands::Parset { command } => cmd_parset(&ctx, command),
                Commands::Completion { .. } | Commands::Config { .. } => Ok(()),
            }
        }
    }
}

/// Layered settings with command-line overrides on top.
fn load_settings(cli: &Cli) -> CliResult<Settings> {
    let mut settings = Settings::load(cli.store.as_deref())?;
    if let Some(dir) = &cli.store {
        settings.store_dir = dir.clone();
    }
    if let Some(user) = &cli.user {
        settings.user = user.clone();
    }
    debug!(store = %settings.store_dir.display(), user = %settings.user, "settings loaded");
    Ok(settings)
}

fn resolve_node(ctx: &ServiceContainer, tree: TreeId, arg: &str) -> CliResult<NodeId> {
    match NodeRef::parse(arg) {
        NodeRef::Id(id) => Ok(id),
        NodeRef::Name(name) => Ok(ctx
            .store
            .read(tree, |rec| rec.resolve_path(&name).map(|n| n.node_id))?),
    }
}

/// The given node, or the tree's root when none is given.
fn node_or_root(ctx: &ServiceContainer, tree: TreeId, arg: Option<&str>) -> CliResult<NodeId> {
    match arg {
        Some(arg) => resolve_node(ctx, tree, arg),
        None => Ok(ctx.query.get_top_node(tree)?.node_id),
    }
}

fn parse_timestamp(arg: Option<&str>) -> CliResult<Option<DateTime<Utc>>> {
    arg.map(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| CliError::InvalidArgs(format!("timestamp '{s}': {e}")))
    })
    .transpose()
}

fn node_line(ctx: &ServiceContainer, node: &Node) -> CliResult<String> {
    let name = ctx.query.get_qualified_name(node.tree_id, node.node_id)?;
    let mut line = match &node.kind {
        NodeKind::Leaf { .. } => format!("{:>6}  {}={}", node.node_id, name, node.limits()),
        NodeKind::Group { instances } => format!("{:>6}  {} (x{})", node.node_id, name, instances),
    };
    if node.superseded {
        line.push_str("  [superseded]");
    }
    Ok(line)
}

fn print_nodes(ctx: &ServiceContainer, nodes: &[Node]) -> CliResult<()> {
    for node in nodes {
        output::info(&node_line(ctx, node)?);
    }
    Ok(())
}

fn print_tree_info(info: &TreeInfo) {
    output::header(&format!("Tree {}", info.tree_id));
    output::detail(&format!("type:           {}", info.tree_type));
    output::detail(&format!("classification: {}", info.classification));
    output::detail(&format!("state:          {}", info.state));
    output::detail(&format!("creator:        {}", info.creator));
    output::detail(&format!("created:        {}", info.creation_date.to_rfc3339()));
    if let Some(original) = info.original_tree {
        output::detail(&format!("derived from:   {original}"));
    }
    if let Some(mom_id) = info.mom_id {
        output::detail(&format!("MoM id:         {mom_id}"));
    }
    if !info.campaign.is_empty() {
        output::detail(&format!("campaign:       {}", info.campaign));
    }
    if !info.description.is_empty() {
        output::detail(&format!("description:    {}", info.description));
    }
}

#[instrument(skip(ctx))]
fn cmd_component(ctx: &ServiceContainer, command: &ComponentCommands) -> CliResult<()> {
    match command {
        ComponentCommands::Load { file } => {
            let tree = ctx.components.load_file(file)?;
            output::success(&format!("component tree {tree} loaded from {}", file.display()));
        }
    }
    Ok(())
}

#[instrument(skip(ctx))]
fn cmd_template(ctx: &ServiceContainer, command: &TemplateCommands) -> CliResult<()> {
    match command {
        TemplateCommands::Build {
            tree,
            node,
            classification,
        } => {
            let top = node_or_root(ctx, *tree, node.as_deref())?;
            let template = ctx
                .templates
                .build_template_tree(*tree, top, *classification)?;
            output::success(&format!("template tree {template} built from {tree}:{top}"));
        }
        TemplateCommands::Copy { tree } => {
            let copy = ctx.templates.copy_template_tree(*tree)?;
            output::success(&format!("template tree {tree} copied to {copy}"));
        }
    }
    Ok(())
}

#[instrument(skip(ctx))]
fn cmd_instantiate(ctx: &ServiceContainer, template: TreeId) -> CliResult<()> {
    let tree = ctx.instantiator.instanciate_tree(template)?;
    output::success(&format!("hierarchical tree {tree} instantiated from {template}"));
    Ok(())
}

#[instrument(skip(ctx))]
fn cmd_tree(ctx: &ServiceContainer, command: &TreeCommands) -> CliResult<()> {
    match command {
        TreeCommands::List {
            tree_type,
            classification,
        } => {
            for info in ctx.query.get_tree_list(*tree_type, *classification)? {
                output::info(&format!(
                    "{:>6}  {:<12} {:<12} {:<16} {}",
                    info.tree_id,
                    info.tree_type.as_str(),
                    info.classification.as_str(),
                    info.state.as_str(),
                    info.description
                ));
            }
        }
        TreeCommands::Info { tree } => print_tree_info(&ctx.query.get_tree_info(*tree)?),
        TreeCommands::Show { tree, node } => {
            let top = node_or_root(ctx, *tree, node.as_deref())?;
            output::info(&ctx.query.get_subtree(*tree, top)?.to_tree_string());
        }
        TreeCommands::State { tree, state } => {
            let old = ctx.classifier.set_tree_state(*tree, *state)?;
            output::action("state", &format!("tree {tree}: {old} -> {state}"));
        }
        TreeCommands::Classify {
            tree,
            classification,
        } => {
            ctx.classifier.set_classification(*tree, *classification)?;
            output::action("classification", &format!("tree {tree}: {classification}"));
        }
        TreeCommands::Describe { tree, description } => {
            ctx.classifier.set_description(*tree, description)?;
            output::success(&format!("tree {tree} description updated"));
        }
        TreeCommands::Mom {
            tree,
            mom_id,
            campaign,
        } => {
            ctx.classifier.set_mom_info(*tree, *mom_id, campaign)?;
            output::success(&format!("tree {tree} MoM info updated"));
        }
        TreeCommands::Check { tree, node } => {
            let top = node_or_root(ctx, *tree, node.as_deref())?;
            ctx.classifier.check_tree_constraints(*tree, top)?;
            output::success(&format!("tree {tree} satisfies all constraints"));
        }
        TreeCommands::Delete { tree } => {
            ctx.classifier.delete_tree(*tree)?;
            output::action("deleted", &format!("tree {tree}"));
        }
        TreeCommands::History { tree, since, until } => {
            let since = parse_timestamp(since.as_deref())?;
            let until = parse_timestamp(until.as_deref())?;
            for change in ctx.query.get_state_list(*tree, since, until)? {
                output::info(&format!(
                    "{}  tree {:>4}  {} -> {}  by {}",
                    change.timestamp.to_rfc3339(),
                    change.tree_id,
                    change.from,
                    change.to,
                    change.user
                ));
            }
        }
        TreeCommands::Prune { tree, level } => {
            let level = level.unwrap_or(ctx.settings.prune_level);
            let removed = ctx.instantiator.prune_tree(*tree, level)?;
            match removed {
                0 => output::info(&format!("tree {tree}: nothing to prune")),
                n => output::action("pruned", &format!("{n} nodes from tree {tree}")),
            }
        }
    }
    Ok(())
}

#[instrument(skip(ctx))]
fn cmd_node(ctx: &ServiceContainer, command: &NodeCommands) -> CliResult<()> {
    match command {
        NodeCommands::Get { tree, node } => {
            let node = ctx.query.get_node(*tree, resolve_node(ctx, *tree, node)?)?;
            output::info(&node_line(ctx, &node)?);
            if !node.description.is_empty() {
                output::detail(&node.description);
            }
        }
        NodeCommands::Children { tree, node, depth } => {
            let top = resolve_node(ctx, *tree, node)?;
            print_nodes(ctx, &ctx.query.get_item_list(*tree, top, *depth)?)?;
        }
        NodeCommands::Find { tree, pattern } => {
            print_nodes(ctx, &ctx.query.get_items_matching(*tree, pattern)?)?;
        }
        NodeCommands::Add {
            tree,
            parent,
            name,
            index,
            instances,
            value,
            description,
        } => {
            let parent = match parent {
                Some(parent) => resolve_node(ctx, *tree, parent)?,
                None => ROOT_PARENT,
            };
            let kind = match (instances, value) {
                (Some(n), None) => NodeKind::group(*n),
                (None, Some(v)) => NodeKind::Leaf {
                    value: LeafValue::from_limits(v),
                    constraint: None,
                },
                _ => {
                    return Err(CliError::InvalidArgs(
                        "give exactly one of --instances or --value".into(),
                    ))
                }
            };
            let id = ctx
                .nodes
                .add_node(*tree, parent, name, *index, kind, description)?;
            output::success(&format!("node {id} added to tree {tree}"));
        }
        NodeCommands::Set {
            tree,
            node,
            value,
            instances,
            description,
        } => {
            let mut node = ctx.nodes.get_node(*tree, resolve_node(ctx, *tree, node)?)?;
            match (&mut node.kind, value, instances) {
                (NodeKind::Leaf { value: current, .. }, Some(v), None) => {
                    *current = LeafValue::from_limits(v)
                }
                (NodeKind::Group { instances: current }, None, Some(n)) => *current = *n,
                (_, None, None) => {}
                (NodeKind::Leaf { .. }, _, _) => {
                    return Err(CliError::InvalidArgs(
                        "leaves take --value, not --instances".into(),
                    ))
                }
                (NodeKind::Group { .. }, _, _) => {
                    return Err(CliError::InvalidArgs(
                        "groups take --instances, not --value".into(),
                    ))
                }
            }
            if let Some(description) = description {
                node.description = description.clone();
            }
            ctx.nodes.save_node(&node)?;
            output::info(&node_line(ctx, &node)?);
        }
        NodeCommands::Dup { tree, node, index } => {
            let org = resolve_node(ctx, *tree, node)?;
            let copy = ctx.duplicator.dup_node(*tree, org, *index)?;
            output::success(&format!("node {org} duplicated as {copy}"));
        }
        NodeCommands::Delete { tree, nodes } => {
            let nodes = nodes
                .iter()
                .map(|arg| -> CliResult<Node> {
                    let id = resolve_node(ctx, *tree, arg)?;
                    Ok(ctx.nodes.get_node(*tree, id)?)
                })
                .collect::<CliResult<Vec<_>>>()?;
            let removed = ctx.duplicator.delete_node_list(&nodes)?;
            output::action(
                "deleted",
                &format!(
                    "{removed} nodes (subtrees of {})",
                    nodes.iter().map(|n| n.node_id).join(", ")
                ),
            );
        }
        NodeCommands::Supersede { tree, node } => {
            let id = resolve_node(ctx, *tree, node)?;
            let marked = ctx.nodes.supersede_node(*tree, id)?;
            output::action("superseded", &format!("{marked} nodes below {id}"));
        }
    }
    Ok(())
}

#[instrument(skip(ctx))]
fn cmd_parset(ctx: &ServiceContainer, command: &ParsetCommands) -> CliResult<()> {
    match command {
        ParsetCommands::Export { tree, node, output: path } => {
            let top = node_or_root(ctx, *tree, node.as_deref())?;
            match path {
                Some(path) => {
                    let lines = ctx.paramsets.export_to_file(*tree, top, path)?;
                    output::success(&format!("{lines} parameters written to {}", path.display()));
                }
                None => print!("{}", ctx.paramsets.export(*tree, top)?),
            }
        }
        ParsetCommands::Import { tree, file } => {
            let count = ctx.paramsets.import_from_file(*tree, file)?;
            output::success(&format!("{count} parameters applied to tree {tree}"));
        }
    }
    Ok(())
}

fn cmd_config(cli: &Cli, command: &ConfigCommands) -> CliResult<()> {
    let settings = load_settings(cli)?;
    match command {
        ConfigCommands::Show => output::info(&settings.to_toml()?),
        ConfigCommands::Path => {
            let global = global_config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(no config directory)".into());
            let local: PathBuf = store_config_path(&settings.store_dir);
            output::detail(&format!("global: {global}"));
            output::detail(&format!("store:  {}", local.display()));
        }
    }
    Ok(())
}

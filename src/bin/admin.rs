//! Manager tool: review worker status documents, send actions, and edit
//! the categorized block list.

use chrono::Utc;
use std::path::Path;
use tabwarden::WardenConfig;
use tabwarden::admin::{self, DEFAULT_TEMPLATE_ID, ManagerAction};
use tabwarden::blocklist::BlockList;
use tabwarden::error::{Result, WardenError};
use tabwarden::warden_dirs;
use tabwarden_docstore::DocumentClient;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("tabwarden-admin failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "rows" => list_rows().await,
        "action" => {
            let [doc_id, action] = operands(&args, "action requires <doc-id> <block|warn|accept>")?;
            let action: ManagerAction = action.parse()?;
            admin::write_action(&client()?, doc_id, action, Utc::now()).await?;
            println!("saved '{action}' for {doc_id} and reset flag");
            Ok(())
        }
        "flag" => {
            let [doc_id] = operands(&args, "flag requires <doc-id>")?;
            let at = admin::flag_for_review(&client()?, doc_id, Utc::now()).await?;
            println!("flagged {doc_id} (last flagged {at})");
            Ok(())
        }
        "add-member" => {
            let (new_id, template) = match &args[2..] {
                [id] => (id.as_str(), DEFAULT_TEMPLATE_ID),
                [id, template] => (id.as_str(), template.as_str()),
                _ => {
                    return Err(WardenError::Config(
                        "add-member requires <new-id> [template-id]".to_owned(),
                    ));
                }
            };
            admin::add_team_member(&client()?, template, new_id).await?;
            println!("added {} from {template}", new_id.trim());
            Ok(())
        }
        "blocklist" => blocklist(&args[2..]),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => Err(WardenError::Config(format!(
            "unknown subcommand `{other}` (use rows|action|flag|add-member|blocklist)"
        ))),
    }
}

/// Exactly `N` operands after the subcommand.
fn operands<'a, const N: usize>(args: &'a [String], usage: &str) -> Result<[&'a str; N]> {
    let rest: Vec<&str> = args.iter().skip(2).map(String::as_str).collect();
    rest.try_into()
        .map_err(|_| WardenError::Config(usage.to_owned()))
}

fn load_config() -> Result<WardenConfig> {
    let path = warden_dirs::config_file();
    if !path.exists() {
        return Err(WardenError::Config(format!(
            "no config at {}; run tabwarden-host once to create it",
            path.display()
        )));
    }
    WardenConfig::from_file(&path)
}

fn client() -> Result<DocumentClient> {
    let config = load_config()?;
    config.remote.validate()?;
    Ok(DocumentClient::new(config.remote)?)
}

async fn list_rows() -> Result<()> {
    let rows = admin::fetch_rows(&client()?).await?;
    if rows.is_empty() {
        println!("no documents found");
        return Ok(());
    }
    let now = Utc::now();
    for row in rows {
        println!(
            "{}\t{}\t{}\t{}\tflag={}\taction={}\t{}\t{}",
            row.doc_id,
            row.worker_id,
            row.role,
            row.last_flagged_label(now),
            row.flag,
            row.action,
            if row.link.is_empty() { "-" } else { row.link.as_str() },
            row.review_preview(),
        );
    }
    Ok(())
}

fn blocklist(args: &[String]) -> Result<()> {
    let path = warden_dirs::block_list_file();
    let mut list = BlockList::load_or_default(&path)?;
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        [] | ["show"] => {
            for category in list.categories() {
                println!("{category}");
                for url in list.entries(category).unwrap_or_default() {
                    println!("  {url}");
                }
            }
            return Ok(());
        }
        ["add", category, url] => {
            let stored = list.add(category, url)?;
            println!("added {stored} to {category}");
        }
        ["remove", category, url] => {
            if !list.remove(category, url) {
                return Err(WardenError::Config(format!("{url} is not in {category}")));
            }
            println!("removed {url} from {category}");
        }
        ["move", from, to, urls @ ..] if !urls.is_empty() => {
            let urls: Vec<String> = urls.iter().map(|u| (*u).to_owned()).collect();
            let moved = list.move_urls(from, to, &urls)?;
            println!("moved {moved} entries from {from} to {to}");
        }
        ["reset"] => {
            list = BlockList::default();
            println!("block list reset to defaults");
        }
        ["import", file] => {
            list.import_json(&std::fs::read_to_string(Path::new(file))?)?;
            println!("imported {file}");
        }
        ["export"] => {
            println!("{}", list.export_json()?);
            return Ok(());
        }
        ["export", file] => {
            std::fs::write(Path::new(file), list.export_json()?)?;
            println!("exported to {file}");
            return Ok(());
        }
        ["apply"] => {
            let config_path = warden_dirs::config_file();
            let mut config = load_config()?;
            let added = config.enforcement.apply_block_list(&list);
            config.save_to_file(&config_path)?;
            println!(
                "added {added} prefixes to {}; restart tabwarden-host to pick them up",
                config_path.display()
            );
            return Ok(());
        }
        _ => {
            return Err(WardenError::Config(
                "usage: blocklist <show|add|remove|move|reset|import|export|apply>".to_owned(),
            ));
        }
    }

    list.save(&path)
}

fn print_usage() {
    println!(
        "usage: tabwarden-admin <command>\n\
         \n  rows                              list status documents, newest flag first\
         \n  action <doc-id> <block|warn|accept>\
         \n  flag <doc-id>                     flag a document for review\
         \n  add-member <new-id> [template-id] copy a status document\
         \n  blocklist show\
         \n  blocklist add <category> <url>\
         \n  blocklist remove <category> <url>\
         \n  blocklist move <from> <to> <url>...\
         \n  blocklist reset | import <file> | export [file] | apply"
    );
}

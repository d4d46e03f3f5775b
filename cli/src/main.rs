//! Agent World CLI: a thin terminal client for the server's command/RPC surface.
//!
//! Subcommands mirror the wire protocol one-to-one: `world`, `agent`, `chat`,
//! `message`, `subscribe`, `ping`, plus `serve` to run the server itself.

mod auto_start;
mod client;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use server::protocol::ClientCommand;

const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8080";

#[derive(Parser, Debug)]
#[command(name = "agent-world")]
#[command(about = "Agent World — command-line client for the world runtime server")]
struct Args {
    #[command(subcommand)]
    cmd: Command,

    /// Server WebSocket URL (default: ws://127.0.0.1:8080 or AGENT_WORLD_REMOTE_URL)
    #[arg(long, global = true, value_name = "URL")]
    remote: Option<String>,

    /// Do not auto-start the server when the connection is refused
    #[arg(long, global = true)]
    no_auto_start: bool,

    /// Pretty-print JSON output (multi-line). Default: compact, one line.
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run the WebSocket server.
    Serve(ServeArgs),
    /// Round-trip ping.
    Ping,
    /// Manage worlds.
    World(WorldArgs),
    /// Manage agents within a world.
    Agent(AgentArgs),
    /// Manage chats within a world.
    Chat(ChatArgs),
    /// Send, edit, delete, or stop messages.
    Message(MessageArgs),
    /// Subscribe to a world's event stream and print events as they arrive.
    Subscribe(SubscribeArgs),
}

#[derive(clap::Args, Debug, Clone)]
struct ServeArgs {
    /// Listen address (default 127.0.0.1:8080)
    #[arg(long, value_name = "ADDR")]
    addr: Option<String>,
    /// Keep running after the first connection closes (default: exit after first)
    #[arg(long)]
    keep_alive: bool,
}

#[derive(clap::Args, Debug, Clone)]
struct WorldArgs {
    #[command(subcommand)]
    sub: WorldCommand,
}

#[derive(Subcommand, Debug, Clone)]
enum WorldCommand {
    List,
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    Get {
        world_id: String,
    },
    Update {
        world_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        turn_limit: Option<u32>,
        #[arg(long, value_name = "AGENT_ID")]
        main_agent: Option<String>,
        /// Clear the main agent (takes precedence over --main-agent)
        #[arg(long)]
        clear_main_agent: bool,
        #[arg(long)]
        variables: Option<String>,
    },
    Delete {
        world_id: String,
    },
    Export {
        world_id: String,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct AgentArgs {
    #[command(subcommand)]
    sub: AgentCommand,
}

#[derive(Subcommand, Debug, Clone)]
enum AgentCommand {
    List {
        world_id: String,
    },
    Create {
        world_id: String,
        name: String,
        #[arg(long, default_value = "")]
        system_prompt: String,
        #[arg(long)]
        llm_provider: Option<String>,
        #[arg(long)]
        llm_model: Option<String>,
    },
    Update {
        world_id: String,
        agent_id: String,
        #[arg(long)]
        system_prompt: Option<String>,
        #[arg(long)]
        llm_provider: Option<String>,
        #[arg(long)]
        llm_model: Option<String>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        auto_reply: Option<bool>,
    },
    Delete {
        world_id: String,
        agent_id: String,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct ChatArgs {
    #[command(subcommand)]
    sub: ChatCommand,
}

#[derive(Subcommand, Debug, Clone)]
enum ChatCommand {
    List {
        world_id: String,
    },
    New {
        world_id: String,
    },
    Delete {
        world_id: String,
        chat_id: String,
    },
    Branch {
        world_id: String,
        chat_id: String,
        from_message_id: String,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct MessageArgs {
    #[command(subcommand)]
    sub: MessageCommand,
}

#[derive(Subcommand, Debug, Clone)]
enum MessageCommand {
    Send {
        world_id: String,
        chat_id: String,
        content: String,
        #[arg(long, default_value = "user")]
        sender: String,
    },
    Edit {
        world_id: String,
        message_id: String,
        new_content: String,
    },
    Delete {
        world_id: String,
        message_id: String,
    },
    Stop {
        world_id: String,
        chat_id: String,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct SubscribeArgs {
    world_id: String,
    #[arg(long)]
    chat_id: Option<String>,
    #[arg(long, default_value_t = 0)]
    since_seq: u64,
}

fn resolve_remote_url(args: &Args) -> String {
    if let Some(ref u) = args.remote {
        return u.clone();
    }
    std::env::var("AGENT_WORLD_REMOTE_URL").unwrap_or_else(|_| DEFAULT_WS_URL.to_string())
}

fn resolve_auto_start(args: &Args) -> bool {
    if args.no_auto_start {
        return false;
    }
    !matches!(std::env::var("AGENT_WORLD_NO_AUTO_START").as_deref(), Ok("1") | Ok("true") | Ok("yes"))
}

fn to_command(cmd: &Command) -> ClientCommand {
    match cmd {
        Command::Serve(_) => unreachable!("serve handled in main before dispatch"),
        Command::Ping => ClientCommand::Ping,
        Command::World(a) => match &a.sub {
            WorldCommand::List => ClientCommand::ListWorlds,
            WorldCommand::Create { name, description } => {
                ClientCommand::CreateWorld { name: name.clone(), description: description.clone() }
            }
            WorldCommand::Get { world_id } => ClientCommand::GetWorld { world_id: world_id.clone() },
            WorldCommand::Update { world_id, name, description, turn_limit, main_agent, clear_main_agent, variables } => {
                ClientCommand::UpdateWorld {
                    world_id: world_id.clone(),
                    name: name.clone(),
                    description: description.clone(),
                    turn_limit: *turn_limit,
                    main_agent: if *clear_main_agent {
                        Some(None)
                    } else {
                        main_agent.clone().map(Some)
                    },
                    variables: variables.clone(),
                }
            }
            WorldCommand::Delete { world_id } => ClientCommand::DeleteWorld { world_id: world_id.clone() },
            WorldCommand::Export { world_id } => ClientCommand::ExportWorld { world_id: world_id.clone() },
        },
        Command::Agent(a) => match &a.sub {
            AgentCommand::List { world_id } => ClientCommand::ListAgents { world_id: world_id.clone() },
            AgentCommand::Create { world_id, name, system_prompt, llm_provider, llm_model } => {
                ClientCommand::CreateAgent {
                    world_id: world_id.clone(),
                    name: name.clone(),
                    system_prompt: system_prompt.clone(),
                    llm_provider: llm_provider.clone(),
                    llm_model: llm_model.clone(),
                }
            }
            AgentCommand::Update { world_id, agent_id, system_prompt, llm_provider, llm_model, temperature, max_tokens, auto_reply } => {
                ClientCommand::UpdateAgent {
                    world_id: world_id.clone(),
                    agent_id: agent_id.clone(),
                    system_prompt: system_prompt.clone(),
                    llm_provider: llm_provider.clone(),
                    llm_model: llm_model.clone(),
                    temperature: *temperature,
                    max_tokens: *max_tokens,
                    auto_reply: *auto_reply,
                }
            }
            AgentCommand::Delete { world_id, agent_id } => {
                ClientCommand::DeleteAgent { world_id: world_id.clone(), agent_id: agent_id.clone() }
            }
        },
        Command::Chat(a) => match &a.sub {
            ChatCommand::List { world_id } => ClientCommand::ListChats { world_id: world_id.clone() },
            ChatCommand::New { world_id } => ClientCommand::NewChat { world_id: world_id.clone() },
            ChatCommand::Delete { world_id, chat_id } => {
                ClientCommand::DeleteChat { world_id: world_id.clone(), chat_id: chat_id.clone() }
            }
            ChatCommand::Branch { world_id, chat_id, from_message_id } => ClientCommand::BranchChat {
                world_id: world_id.clone(),
                chat_id: chat_id.clone(),
                from_message_id: from_message_id.clone(),
            },
        },
        Command::Message(a) => match &a.sub {
            MessageCommand::Send { world_id, chat_id, content, sender } => ClientCommand::SendMessage {
                world_id: world_id.clone(),
                chat_id: chat_id.clone(),
                content: content.clone(),
                sender: sender.clone(),
            },
            MessageCommand::Edit { world_id, message_id, new_content } => ClientCommand::EditMessage {
                world_id: world_id.clone(),
                message_id: message_id.clone(),
                new_content: new_content.clone(),
            },
            MessageCommand::Delete { world_id, message_id } => {
                ClientCommand::DeleteMessage { world_id: world_id.clone(), message_id: message_id.clone() }
            }
            MessageCommand::Stop { world_id, chat_id } => {
                ClientCommand::Stop { world_id: world_id.clone(), chat_id: chat_id.clone() }
            }
        },
        Command::Subscribe(_) => unreachable!("subscribe handled in main before dispatch"),
    }
}

fn print_json(value: &serde_json::Value, pretty: bool) {
    let s = if pretty {
        serde_json::to_string_pretty(value).unwrap_or_default()
    } else {
        serde_json::to_string(value).unwrap_or_default()
    };
    println!("{}", s);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    config::load_and_apply("agent-world", None::<&PathBuf>).ok();
    let _tracing_guard = config::init_tracing(None);

    let args = Args::parse();

    if let Command::Serve(sa) = &args.cmd {
        if let Err(e) = server::run_server(sa.addr.as_deref(), !sa.keep_alive).await {
            eprintln!("serve error: {}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    let url = resolve_remote_url(&args);
    if resolve_auto_start(&args) {
        if let Err(e) = auto_start::ensure_server_or_spawn(&url).await {
            eprintln!("agent-world: {}", e);
            std::process::exit(1);
        }
    }

    let mut ws = match client::connect(&url).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("agent-world: {}", e);
            std::process::exit(1);
        }
    };

    if let Command::Subscribe(sa) = &args.cmd {
        if let Err(e) = client::stream_subscription(&mut ws, sa.world_id.clone(), sa.chat_id.clone(), sa.since_seq).await {
            eprintln!("agent-world: {}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    let command = to_command(&args.cmd);
    match client::request(&mut ws, command).await {
        Ok(data) => print_json(&data, args.pretty),
        Err(e) => {
            eprintln!("agent-world: {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_command_maps_world_update_main_agent_clear_over_set() {
        let cmd = Command::World(WorldArgs {
            sub: WorldCommand::Update {
                world_id: "w1".to_string(),
                name: None,
                description: None,
                turn_limit: None,
                main_agent: Some("reviewer".to_string()),
                clear_main_agent: true,
                variables: None,
            },
        });
        match to_command(&cmd) {
            ClientCommand::UpdateWorld { main_agent, .. } => assert_eq!(main_agent, Some(None)),
            other => panic!("expected UpdateWorld, got {other:?}"),
        }
    }

    #[test]
    fn to_command_maps_world_update_main_agent_set() {
        let cmd = Command::World(WorldArgs {
            sub: WorldCommand::Update {
                world_id: "w1".to_string(),
                name: None,
                description: None,
                turn_limit: None,
                main_agent: Some("reviewer".to_string()),
                clear_main_agent: false,
                variables: None,
            },
        });
        match to_command(&cmd) {
            ClientCommand::UpdateWorld { main_agent, .. } => assert_eq!(main_agent, Some(Some("reviewer".to_string()))),
            other => panic!("expected UpdateWorld, got {other:?}"),
        }
    }

    #[test]
    fn to_command_maps_ping() {
        assert!(matches!(to_command(&Command::Ping), ClientCommand::Ping));
    }

    #[test]
    fn resolve_remote_url_prefers_explicit_flag() {
        let args = Args { cmd: Command::Ping, remote: Some("ws://example:1".to_string()), no_auto_start: false, pretty: false };
        assert_eq!(resolve_remote_url(&args), "ws://example:1");
    }
}

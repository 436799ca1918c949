#![forbid(unsafe_code)]

use rh_client::notices::drain;
use rh_client::{
    ClientConfig, FeedHub, HttpBackend, NoticeReceiver, Redirector, Session, SessionDeps,
    Settlement, Submission, config::parse_millis,
};
use rh_core::model::{AccountKind, Identity, NewBankAccount};
use rh_storage::SqliteMarkers;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PAGE_SIZE: u32 = 20;

fn usage() -> &'static str {
    "rh — reward hub client\n\n\
USAGE:\n\
  rh [--api-base URL] [--storage-dir DIR] [--confirm-timeout-ms MS] <COMMAND> [ARGS]\n\n\
COMMANDS:\n\
  login EMAIL PASSWORD\n\
  register EMAIL PASSWORD [INVITE_CODE]\n\
  logout\n\
  whoami\n\
  tasks [PAGE]\n\
  catalog\n\
  like PLATFORM_ID\n\
  start PLATFORM_ID\n\
  submit-proof TASK_ID IMAGE_URL\n\
  bind-phone PHONE\n\
  bind-account BANK_NAME ACCOUNT_NAME ACCOUNT_NUMBER [bank|ewallet|crypto]\n\
  withdraw AMOUNT ACCOUNT_ID\n\
  read-all\n\
  popup\n\
  dismiss-popup\n\n\
NOTES:\n\
  - env: RH_API_BASE, RH_API_TOKEN, RH_REQUEST_TIMEOUT_MS, RH_CONFIRM_TIMEOUT_MS, RH_STORAGE_DIR.\n\
  - logging goes to stderr; set RH_LOG (default `warn`).\n"
}

#[derive(Clone, Debug, PartialEq)]
enum Command {
    Login {
        email: String,
        password: String,
    },
    Register {
        email: String,
        password: String,
        invite_code: Option<String>,
    },
    Logout,
    Whoami,
    Tasks {
        page: u32,
    },
    Catalog,
    Like {
        platform_id: String,
    },
    Start {
        platform_id: String,
    },
    SubmitProof {
        task_id: String,
        image_url: String,
    },
    BindPhone {
        phone: String,
    },
    BindAccount(NewBankAccount),
    Withdraw {
        amount: f64,
        account_id: String,
    },
    ReadAll,
    Popup,
    DismissPopup,
}

impl Command {
    fn needs_session(&self) -> bool {
        !matches!(
            self,
            Self::Login { .. } | Self::Register { .. } | Self::Catalog
        )
    }
}

#[derive(Debug)]
struct CliArgs {
    config: ClientConfig,
    command: Command,
}

fn parse_args(args: &[String], mut config: ClientConfig) -> Result<CliArgs, String> {
    let mut positional = Vec::new();
    let mut i = 0usize;
    while i < args.len() {
        let a = args[i].as_str();
        match a {
            "--api-base" => {
                i += 1;
                let v = args.get(i).ok_or("--api-base requires URL")?;
                config.set_api_base(v).map_err(|e| e.to_string())?;
            }
            "--storage-dir" => {
                i += 1;
                let v = args.get(i).ok_or("--storage-dir requires DIR")?;
                config.storage_dir = PathBuf::from(v);
            }
            "--confirm-timeout-ms" => {
                i += 1;
                let v = args.get(i).ok_or("--confirm-timeout-ms requires MS")?;
                let limit = parse_millis("--confirm-timeout-ms", v).map_err(|e| e.to_string())?;
                config.confirm_timeout = Some(limit);
            }
            other if other.starts_with("--") => {
                return Err(format!("unknown flag: {other}\n\n{}", usage()));
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }
    let command = parse_command(&positional)?;
    Ok(CliArgs { config, command })
}

fn parse_command(words: &[String]) -> Result<Command, String> {
    let Some((name, rest)) = words.split_first() else {
        return Err(format!("missing command\n\n{}", usage()));
    };
    let arg = |index: usize, what: &str| {
        rest.get(index)
            .cloned()
            .ok_or_else(|| format!("{name} requires {what}"))
    };
    let command = match name.as_str() {
        "login" => Command::Login {
            email: arg(0, "EMAIL")?,
            password: arg(1, "PASSWORD")?,
        },
        "register" => Command::Register {
            email: arg(0, "EMAIL")?,
            password: arg(1, "PASSWORD")?,
            invite_code: rest.get(2).cloned(),
        },
        "logout" => Command::Logout,
        "whoami" => Command::Whoami,
        "tasks" => Command::Tasks {
            page: match rest.first() {
                Some(raw) => raw
                    .parse::<u32>()
                    .ok()
                    .filter(|page| *page > 0)
                    .ok_or("tasks PAGE must be a positive integer")?,
                None => 1,
            },
        },
        "catalog" => Command::Catalog,
        "like" => Command::Like {
            platform_id: arg(0, "PLATFORM_ID")?,
        },
        "start" => Command::Start {
            platform_id: arg(0, "PLATFORM_ID")?,
        },
        "submit-proof" => Command::SubmitProof {
            task_id: arg(0, "TASK_ID")?,
            image_url: arg(1, "IMAGE_URL")?,
        },
        "bind-phone" => Command::BindPhone {
            phone: arg(0, "PHONE")?,
        },
        "bind-account" => Command::BindAccount(NewBankAccount {
            bank_name: arg(0, "BANK_NAME")?,
            account_name: arg(1, "ACCOUNT_NAME")?,
            account_number: arg(2, "ACCOUNT_NUMBER")?,
            kind: match rest.get(3).map(String::as_str) {
                None | Some("bank") => AccountKind::Bank,
                Some("ewallet") => AccountKind::Ewallet,
                Some("crypto") => AccountKind::Crypto,
                Some(other) => return Err(format!("unknown account type: {other}")),
            },
        }),
        "withdraw" => Command::Withdraw {
            amount: arg(0, "AMOUNT")?
                .parse::<f64>()
                .map_err(|_| "withdraw AMOUNT must be a number")?,
            account_id: arg(1, "ACCOUNT_ID")?,
        },
        "read-all" => Command::ReadAll,
        "popup" => Command::Popup,
        "dismiss-popup" => Command::DismissPopup,
        other => return Err(format!("unknown command: {other}\n\n{}", usage())),
    };
    Ok(command)
}

/// Prints partner pages instead of launching a browser.
struct PrintRedirector;

impl Redirector for PrintRedirector {
    fn open(&self, url: &str) {
        println!("open: {url}");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print!("{}", usage());
        return Ok(());
    }
    init_tracing();

    let config = ClientConfig::from_env()?;
    let cli = match parse_args(&args, config) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli))
}

async fn run(cli: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    let markers = SqliteMarkers::open(&cli.config.storage_dir)?;
    let backend = HttpBackend::new(&cli.config)?;
    let (session, mut notices) = Session::new(
        SessionDeps {
            backend: Arc::new(backend),
            markers: Arc::new(markers),
            feed: Arc::new(FeedHub::new()),
            redirector: Arc::new(PrintRedirector),
        },
        cli.config.confirm_timeout,
    );

    if cli.command.needs_session() && session.restore().await?.is_none() {
        return Err("not signed in; run `rh login EMAIL PASSWORD` first".into());
    }

    let outcome = execute(&session, cli.command).await;
    print_notices(&mut notices);
    outcome
}

async fn execute(session: &Session, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Login { email, password } => {
            let identity = session.login(&email, &password).await?;
            print_identity(&identity);
        }
        Command::Register {
            email,
            password,
            invite_code,
        } => {
            let identity = session
                .register(&email, &password, invite_code.as_deref())
                .await?;
            print_identity(&identity);
        }
        Command::Logout => {
            session.logout()?;
            println!("signed out");
        }
        Command::Whoami => {
            if let Some(identity) = session.identity() {
                print_identity(&identity);
            }
        }
        Command::Tasks { page } => {
            let listing = session.tasks(page, DEFAULT_PAGE_SIZE).await?;
            for task in &listing.items {
                println!(
                    "{}\t{}\t{}\t{:.0}",
                    task.id,
                    task.platform_name,
                    task.status.as_str(),
                    task.reward_amount
                );
            }
            let loaded = shown_through(page, listing.items.len());
            println!("{loaded}/{} shown", listing.total);
        }
        Command::Catalog => {
            let catalog = session.load_catalog().await?;
            for platform in &catalog.platforms {
                let pin = if platform.is_pinned { "*" } else { " " };
                println!(
                    "{pin} {}\t{}\t+{:.0}\t{} likes",
                    platform.id,
                    platform.name,
                    platform.reward_amount,
                    platform.like_count()
                );
            }
        }
        Command::Like { platform_id } => {
            session.load_catalog().await?;
            report(session.like(&platform_id)).await?;
        }
        Command::Start { platform_id } => {
            session.load_catalog().await?;
            report(session.start_task(&platform_id)).await?;
        }
        Command::SubmitProof { task_id, image_url } => {
            report(session.submit_proof(&task_id, &image_url)).await?;
        }
        Command::BindPhone { phone } => report(session.bind_phone(&phone)).await?,
        Command::BindAccount(account) => report(session.bind_account(account)).await?,
        Command::Withdraw { amount, account_id } => {
            session.load_config().await?;
            report(session.withdraw(amount, &account_id)).await?;
        }
        Command::ReadAll => report(session.mark_all_read()).await?,
        Command::Popup => match session.indicators().reward_popup {
            Some(tx) => println!("reward: +{:.0} ({})\t{}", tx.amount, tx.id, tx.description),
            None => println!("no reward to show"),
        },
        Command::DismissPopup => match session.dismiss_reward_popup() {
            Some(id) => println!("dismissed {id}"),
            None => println!("no reward to show"),
        },
    }
    Ok(())
}

/// Rows listed up to and including `page` when it held `on_page` rows.
fn shown_through(page: u32, on_page: usize) -> u64 {
    u64::from(page.saturating_sub(1))
        .saturating_mul(u64::from(DEFAULT_PAGE_SIZE))
        .saturating_add(on_page as u64)
}

async fn report(submission: Submission) -> Result<(), Box<dyn std::error::Error>> {
    let pending = match submission {
        Submission::Pending(pending) => pending,
        Submission::Skipped(reason) => {
            println!("skipped: {reason}");
            return Ok(());
        }
        Submission::Invalid(err) => return Err(err.into()),
    };
    let label = pending.label();
    match pending.settled().await {
        Settlement::Confirmed => println!("{label}: confirmed"),
        Settlement::Swallowed(err) => println!("{label}: already done ({err})"),
        Settlement::RolledBack(err) | Settlement::Superseded(err) => return Err(err.into()),
        Settlement::Abandoned => return Err(format!("{label}: confirmation abandoned").into()),
    }
    Ok(())
}

fn print_identity(identity: &Identity) {
    println!("{} <{}>", identity.id, identity.email);
    println!(
        "balance: {} {:.0}  vip: {}  tasks: {}  unread messages: {}",
        identity.currency,
        identity.balance,
        identity.vip_level,
        identity.my_tasks.len(),
        identity.unread_message_count()
    );
}

fn print_notices(rx: &mut NoticeReceiver) {
    for notice in drain(rx) {
        println!("! {notice}");
    }
}

//! ipa-buyer CLI
//!
//! Sign in, search and purchase through the bundled ipatool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ipa_buyer::core::logging::init_tracing;
use ipa_buyer::orchestration::purchase_succeeded;
use ipa_buyer::{
    AppStoreClient, CancellationToken, CommandResult, ConfigLoadOptions, ConfigLoader,
    ConfigOverrides, DriverError, LoginResult, LoginStatus,
};
use secrecy::SecretString;
use std::path::PathBuf;
use std::process;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

type Input = Lines<BufReader<Stdin>>;

/// App Store sign-in and purchase driver
#[derive(Parser)]
#[command(name = "ipa-buyer")]
#[command(version)]
#[command(about = "App Store sign-in and purchase driver", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./.ipa-buyer.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Per-invocation timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Path to the ipatool executable
    #[arg(long, global = true)]
    tool_path: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in, prompting for the two-factor code when required
    Login {
        #[arg(long)]
        email: String,

        /// Prompted on stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Submit a two-factor code for an account
    Verify {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,

        #[arg(long)]
        code: String,
    },

    /// Search the App Store
    Search {
        #[arg(value_name = "TERM")]
        term: String,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<u32>,

        /// Account to use (defaults to the last signed-in account)
        #[arg(long)]
        email: Option<String>,
    },

    /// Acquire a license for an app
    Purchase {
        #[arg(value_name = "BUNDLE_ID")]
        bundle_id: String,

        #[arg(long)]
        email: Option<String>,
    },

    /// Show the tool's signed-in account
    Info {
        #[arg(long)]
        email: Option<String>,
    },

    /// Revoke stored credentials
    Logout {
        #[arg(long)]
        email: Option<String>,

        /// Also forget the remembered account
        #[arg(long)]
        forget: bool,
    },

    /// Show the remembered account and sign-in flag
    Whoami,
}

#[tokio::main]
async fn main() {
    let result = run().await;

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            eprintln!("{:#}", e);
            if let Some(error) = e.downcast_ref::<DriverError>() {
                report_driver_error(error);
            }
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let overrides = ConfigOverrides {
        config_file: cli.config,
        tool_path: cli.tool_path,
        timeout_secs: cli.timeout,
        data_dir: None,
    };
    let config = ConfigLoader::load(ConfigLoadOptions::from_process(overrides)).await?;

    let validation = ConfigLoader::validate(&config);
    for warning in &validation.warnings {
        eprintln!("⚠️  [{}] {}", warning.field, warning.message);
    }
    if !validation.valid {
        eprintln!("❌ Invalid configuration");
        for error in &validation.errors {
            eprintln!("  - [{}] {}", error.field, error.message);
        }
        return Ok(1);
    }

    let client = AppStoreClient::from_config(&config)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Login { email, password } => {
            let mut input = BufReader::new(tokio::io::stdin()).lines();
            let password = match password {
                Some(password) => password,
                None => prompt(&mut input, "Password: ").await?,
            };
            login_command(&client, &mut input, &email, &secret(password), &cancel).await
        }
        Commands::Verify {
            email,
            password,
            code,
        } => {
            let result = client
                .verify_two_factor(&email, &secret(password), &code, &cancel)
                .await;
            Ok(report_login(&result))
        }
        Commands::Search {
            term,
            limit,
            email,
        } => {
            let account = resolve_account(&client, email)?;
            search_command(&client, &account, &term, limit, &cancel).await
        }
        Commands::Purchase { bundle_id, email } => {
            let account = resolve_account(&client, email)?;
            let result = client.purchase(&account, &bundle_id, &cancel).await?;
            if purchase_succeeded(&result) {
                println!("✅ 购买成功: {}", bundle_id);
                Ok(0)
            } else {
                report_failure(&client, &result);
                Ok(1)
            }
        }
        Commands::Info { email } => {
            let account = resolve_account(&client, email)?;
            let result = client.auth_info(&account, &cancel).await?;
            print_output(&client, &result)
        }
        Commands::Logout { email, forget } => {
            let account = resolve_account(&client, email)?;
            let result = client.logout(&account, &cancel).await?;
            if result.exited_cleanly() {
                if forget {
                    client.forget_account()?;
                }
                println!("✅ 已退出登录: {}", account);
                Ok(0)
            } else {
                report_failure(&client, &result);
                Ok(1)
            }
        }
        Commands::Whoami => {
            match client.whoami() {
                (Some(account), true) => println!("{} (已登录)", account),
                (Some(account), false) => println!("{} (未登录)", account),
                (None, _) => println!("未登录"),
            }
            Ok(0)
        }
    }
}

async fn login_command(
    client: &AppStoreClient,
    input: &mut Input,
    account: &str,
    password: &SecretString,
    cancel: &CancellationToken,
) -> Result<i32> {
    println!("\n🔐 登录 {}\n", account);

    let mut result = client.login(account, password, cancel).await;
    while matches!(
        result.status,
        LoginStatus::RequiresTwoFactor | LoginStatus::AuthCodeInvalid
    ) {
        println!("{}", result.message);
        let code = prompt(input, "验证码: ").await?;
        if code.is_empty() {
            println!("❌ 未输入验证码");
            return Ok(1);
        }
        result = client
            .verify_two_factor(account, password, &code, cancel)
            .await;
    }

    Ok(report_login(&result))
}

fn report_driver_error(error: &DriverError) {
    eprintln!("  [{}]", error.code());
    let actions = error.suggested_actions();
    if !actions.is_empty() {
        eprintln!("\n💡 Suggested actions:");
        for action in actions {
            eprintln!("  - {}", action);
        }
    }
    if error.is_recoverable() {
        eprintln!("\n🔄 可以稍后重试");
    }
}

fn report_login(result: &LoginResult) -> i32 {
    if result.is_success() {
        println!("✅ {}", result.message);
        0
    } else {
        eprintln!("❌ {}", result.message);
        1
    }
}

async fn search_command(
    client: &AppStoreClient,
    account: &str,
    term: &str,
    limit: Option<u32>,
    cancel: &CancellationToken,
) -> Result<i32> {
    println!("\n🔍 {}\n", term);

    let outcome = client.search(account, term, limit, cancel).await?;
    if !outcome.result.exited_cleanly() {
        report_failure(client, &outcome.result);
        return Ok(1);
    }

    match outcome.apps {
        Some(results) if !results.apps.is_empty() => {
            for app in &results.apps {
                let price = if app.is_free() { "免费" } else { app.price.as_str() };
                println!("  {} ({}) v{} [{}]", app.name, app.bundle_id, app.version, price);
            }
            if results.skipped > 0 {
                println!("\n⚠️  {} 条结果无法解析", results.skipped);
            }
        }
        _ => println!("没有找到结果"),
    }
    Ok(0)
}

fn print_output(client: &AppStoreClient, result: &CommandResult) -> Result<i32> {
    if !result.exited_cleanly() {
        report_failure(client, result);
        return Ok(1);
    }
    if let Some(stdout) = &result.stdout {
        println!("{}", stdout.trim());
    }
    Ok(0)
}

fn report_failure(client: &AppStoreClient, result: &CommandResult) {
    if let Some(error) = &result.launch_error {
        eprintln!("❌ 无法启动 ipatool: {}", error);
    } else if result.timed_out {
        eprintln!("❌ 请求超时或已取消");
    } else if let Some(outcome) = client.classify(result) {
        eprintln!("❌ {}", outcome.message());
    } else {
        eprintln!("❌ 退出码 {}", result.exit_code);
    }
}

fn resolve_account(client: &AppStoreClient, email: Option<String>) -> Result<String> {
    email
        .or_else(|| client.session().current_account())
        .context("没有可用的账号，请先登录或指定 --email")
}

fn secret(value: String) -> SecretString {
    SecretString::new(value.into())
}

async fn prompt(input: &mut Input, label: &str) -> Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;

    let line = input.next_line().await.context("读取输入失败")?;
    Ok(line.unwrap_or_default().trim().to_string())
}

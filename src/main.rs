// ==========================================
// POS 导入系统 - 命令行入口
// ==========================================
// 用法:
//   pos-import [db_path] <command> [args...]
//
// 命令:
//   init <company> <customer> <income_account> [tax_account] [--drafts]
//   create-job <connector_id> <file>
//   preview <job_id>
//   submit <job_id>
//   reprocess <job_id>
//   payments <job_id>
//   cancel <job_id>
//   show [job_id]
// ==========================================

use anyhow::{anyhow, bail, Context, Result};
use pos_import::domain::connector::PosConnector;
use pos_import::{logging, ImportApi};
use serde::Serialize;

const COMMANDS: &[&str] = &[
    "init",
    "create-job",
    "preview",
    "submit",
    "reprocess",
    "payments",
    "cancel",
    "show",
];

fn usage() -> String {
    format!(
        "用法: pos-import [db_path] <command> [args...]\n命令: {}",
        COMMANDS.join(", ")
    )
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn required<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("缺少参数 <{}>\n{}", name, usage()))
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        bail!(usage());
    }

    // 第一个参数不是命令时视为数据库路径
    let db_path = if COMMANDS.contains(&args[0].as_str()) {
        pos_import::db::default_db_path()
    } else {
        args.remove(0)
    };
    if args.is_empty() {
        bail!(usage());
    }
    let command = args.remove(0);

    tracing::info!(version = pos_import::VERSION, db_path = %db_path, command = %command, "启动");
    let api = ImportApi::open(&db_path).with_context(|| format!("无法打开数据库: {}", db_path))?;

    match command.as_str() {
        "init" => {
            let company = required(&args, 0, "company")?;
            let customer = required(&args, 1, "customer")?;
            let income_account = required(&args, 2, "income_account")?;
            let tax_account = args.get(3).map(String::as_str).filter(|a| !a.starts_with("--"));
            let mut connector =
                PosConnector::restomax_defaults(company, customer, income_account, tax_account);
            connector.create_draft_invoices = args.iter().any(|a| a == "--drafts");

            api.connectors().upsert(&connector)?;
            print_json(&connector)?;
        }
        "create-job" => {
            let connector_id = required(&args, 0, "connector_id")?;
            let file = required(&args, 1, "file")?;
            print_json(&api.create_job(connector_id, Some(file)).await?)?;
        }
        "preview" => {
            let job_id = required(&args, 0, "job_id")?;
            let response = api.preview_import(job_id).await?;
            println!("{}", response.rendered);
        }
        "submit" => {
            let job_id = required(&args, 0, "job_id")?;
            print_json(&api.submit(job_id).await?)?;
        }
        "reprocess" => {
            let job_id = required(&args, 0, "job_id")?;
            print_json(&api.reprocess_failed(job_id).await?)?;
        }
        "payments" => {
            let job_id = required(&args, 0, "job_id")?;
            print_json(&api.create_pending_payment_entries(job_id).await?)?;
        }
        "cancel" => {
            let job_id = required(&args, 0, "job_id")?;
            print_json(&api.cancel(job_id).await?)?;
        }
        "show" => match args.first() {
            Some(job_id) => print_json(&api.get_job(job_id).await?)?,
            None => print_json(&api.list_jobs().await?)?,
        },
        other => bail!("未知命令: {}\n{}", other, usage()),
    }

    Ok(())
}

//! Desk - EC 后台多层智能体路由系统
//!
//! 入口：加载配置、初始化日志、用演示后台构建引擎，逐行读取指令并输出响应 JSON。
//!
//! 命令：
//! - `/regen`：重新生成上一轮
//! - `/good`、`/bad`：评价上一轮
//! - `/tree`：显示智能体层级
//! - `/quit`：退出

use std::path::PathBuf;

use anyhow::Context;
use desk::config::load_config;
use desk::observability;
use desk::{EngineBuilder, EvaluateRequest, RegenerateRequest, RouteRequest, RouteResponse, Vote};
use tokio::io::{AsyncBufReadExt, BufReader};

const SESSION_ID: &str = "cli";
const USER_ID: &str = "operator";

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("serialize response")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });
    let llm_preference = Some(cfg.llm.default_model.clone());
    let engine = EngineBuilder::new(cfg)
        .build()
        .context("Failed to build engine")?;

    eprintln!("desk ready. 输入后台指令，/tree 查看层级，/quit 退出");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last: Option<(RouteResponse, String)> = None;
    while let Some(line) = lines.next_line().await.context("read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line {
            "/quit" | "/exit" => break,
            "/tree" => println!("{}", engine.tree_display()),
            "/good" | "/bad" => {
                let Some((resp, _)) = &last else {
                    eprintln!("还没有可评价的轮次");
                    continue;
                };
                let vote = if line == "/good" { Vote::Good } else { Vote::Bad };
                let ack = engine
                    .evaluate(EvaluateRequest {
                        trace_id: resp.trace_id.clone(),
                        vote,
                        user_id: USER_ID.to_string(),
                    })
                    .await;
                print_json(&ack)?;
            }
            "/regen" => {
                let Some((resp, message)) = last.take() else {
                    eprintln!("还没有可重新生成的轮次");
                    continue;
                };
                let regen = engine
                    .regenerate(RegenerateRequest {
                        conversation_id: resp.conversation_id.clone(),
                        original_user_message: message.clone(),
                        session_id: SESSION_ID.to_string(),
                        user_id: USER_ID.to_string(),
                        llm_preference: llm_preference.clone(),
                    })
                    .await;
                print_json(&regen)?;
                last = Some((regen, message));
            }
            message => {
                let mut req = RouteRequest::new(SESSION_ID, USER_ID, message);
                req.llm_preference = llm_preference.clone();
                let resp = engine.handle(req).await;
                print_json(&resp)?;
                last = Some((resp, message.to_string()));
            }
        }
    }

    engine.shutdown();
    Ok(())
}

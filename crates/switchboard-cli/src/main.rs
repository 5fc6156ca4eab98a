use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

use switchboard_core::{
    CancellationToken, LoggingBehavior, Mediator, MediatorError, MediatorOptions, NamedRequest,
    Notification, NotificationHandler, Request, RequestHandler, ResponseStream, ServiceRegistry,
    StreamHandler, StreamRequest, ValidationBehavior, ValidationFailure,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Deposit {
    account: String,
    amount: u64,
}

impl Request for Deposit {
    type Response = u64;
}

impl NamedRequest for Deposit {
    const NAME: &'static str = "bank.ledger.deposit.v1";
}

#[derive(Debug, Clone)]
struct Deposited {
    account: String,
    balance: u64,
}

impl Notification for Deposited {}

#[derive(Debug, Clone)]
struct Statement {
    entries: u64,
}

impl StreamRequest for Statement {
    type Item = String;
}

/// 残高を持つだけの小さな台帳
struct DepositHandler {
    balance: Arc<AtomicU64>,
}

#[async_trait]
impl RequestHandler<Deposit> for DepositHandler {
    async fn handle(
        &self,
        request: Deposit,
        _cancel: &CancellationToken,
    ) -> Result<u64, MediatorError> {
        let balance = self.balance.fetch_add(request.amount, Ordering::SeqCst) + request.amount;
        println!("deposited {} into {}", request.amount, request.account);
        Ok(balance)
    }
}

struct PrintReceipt;

#[async_trait]
impl NotificationHandler<Deposited> for PrintReceipt {
    async fn handle(
        &self,
        notification: &Deposited,
        _cancel: &CancellationToken,
    ) -> Result<(), MediatorError> {
        println!(
            "receipt: {} now holds {}",
            notification.account, notification.balance
        );
        Ok(())
    }
}

struct AuditTrail;

#[async_trait]
impl NotificationHandler<Deposited> for AuditTrail {
    async fn handle(
        &self,
        notification: &Deposited,
        _cancel: &CancellationToken,
    ) -> Result<(), MediatorError> {
        tracing::info!(account = %notification.account, balance = notification.balance, "audited");
        Ok(())
    }
}

struct StatementHandler;

impl StreamHandler<Statement> for StatementHandler {
    fn handle(&self, request: Statement, _cancel: CancellationToken) -> ResponseStream<String> {
        stream::iter(1..=request.entries)
            .then(|n| async move {
                sleep(Duration::from_millis(50)).await;
                Ok(format!("entry #{n}"))
            })
            .boxed()
    }
}

fn positive_amount(request: &Deposit) -> Vec<ValidationFailure> {
    if request.amount == 0 {
        vec![ValidationFailure::new("amount", "must be positive")]
    } else {
        vec![]
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // (A) オプションは SWITCHBOARD_OPTIONS（JSON）から。なければ既定値
    let options = match std::env::var("SWITCHBOARD_OPTIONS") {
        Ok(json) => MediatorOptions::from_json_str(&json)?,
        Err(_) => MediatorOptions::default(),
    };

    // (B) handler と behavior を登録
    let mut registry = ServiceRegistry::new();
    registry
        .register_open_behavior(LoggingBehavior::new())
        .register_behavior::<Deposit, _>(ValidationBehavior::new().with(positive_amount))
        .register_request_handler::<Deposit, _>(DepositHandler {
            balance: Arc::new(AtomicU64::new(0)),
        })
        .register_notification_handler::<Deposited, _>(PrintReceipt)
        .register_notification_handler::<Deposited, _>(AuditTrail)
        .register_stream_handler::<Statement, _>(StatementHandler);
    registry.expose_json::<Deposit>()?;

    let mediator = Mediator::builder()
        .registry(registry)
        .options(options)
        .expect_request::<Deposit>()
        .expect_stream::<Statement>()
        .build()?;

    // (C) send → publish
    let balance = mediator
        .send(Deposit {
            account: "alice".into(),
            amount: 100,
        })
        .await?;
    mediator
        .publish(Deposited {
            account: "alice".into(),
            balance,
        })
        .await?;

    let cancel = CancellationToken::new();
    let json = mediator
        .send_json(
            Deposit::NAME,
            serde_json::json!({ "account": "alice", "amount": 25 }),
            &cancel,
        )
        .await?;
    println!("json deposit -> {json}");

    match mediator
        .send(Deposit {
            account: "bob".into(),
            amount: 0,
        })
        .await
    {
        Err(err) => println!("rejected: {err}"),
        Ok(balance) => println!("unexpectedly accepted, balance={balance}"),
    }

    // (D) stream を途中でキャンセル
    let mut statement = mediator.create_stream_with(Statement { entries: 10 }, &cancel)?;
    let stopper = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(175)).await;
            cancel.cancel();
        })
    };
    while let Some(line) = statement.next().await {
        println!("{}", line?);
    }
    stopper.await?;
    println!("statement closed (cancelled={})", cancel.is_cancelled());

    Ok(())
}

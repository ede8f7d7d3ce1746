//! Cardflow CLI
//!
//! Command-line access to the card service. Without `CARDFLOW_PROVIDER_URL`
//! commands run against an in-memory demo portfolio.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use cardflow::card::IssueCardRequest;
use cardflow::conversion::{ConversionFlow, RateTable};
use cardflow::limits::CollateralQuote;
use cardflow::{CardFilter, CardSubType, CardType, ShippingAddress, SpendingLimits};
use cardflow_api::observability::init_tracing;
use cardflow_api::services::{format_money, ConversionRunner, HealthMonitor, TimedExecutor};
use cardflow_api::{
    ApiConfig, AppState, CardService, CurrencyContext, FulfillmentOutcome, FulfillmentService,
    ServiceError,
};

#[derive(Parser)]
#[command(name = "cardflow")]
#[command(about = "Virtual card lifecycle management")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List cards
    List {
        /// active, blocked, issued, expired or all
        #[arg(long, default_value = "all")]
        status: String,

        /// virtual, physical or all
        #[arg(long = "type", default_value = "all")]
        card_type: String,
    },

    /// Show card portfolio statistics
    Stats,

    /// Issue a new card
    Issue {
        #[arg(long)]
        holder: String,

        #[arg(long = "type", default_value = "virtual")]
        card_type: CardType,

        #[arg(long, default_value = "debit")]
        sub_type: CardSubType,

        /// Monthly spending limit
        #[arg(long, default_value = "5000")]
        limit: Decimal,

        #[arg(long, default_value = "1000")]
        daily_limit: Decimal,

        #[arg(long, default_value = "USD")]
        currency: String,

        /// Account to fund the card from
        #[arg(long)]
        account: Option<Uuid>,
    },

    /// Block an active card or unblock a blocked one
    Toggle { card_id: Uuid },

    /// Replace a card's spending limits
    Limits {
        card_id: Uuid,

        #[arg(long)]
        monthly: Decimal,

        #[arg(long)]
        daily: Decimal,
    },

    /// Order a physical card
    OrderPhysical {
        card_id: Uuid,

        #[arg(long, default_value = "")]
        line1: String,

        #[arg(long)]
        line2: Option<String>,

        #[arg(long, default_value = "")]
        city: String,

        #[arg(long, default_value = "")]
        state: String,

        #[arg(long, default_value = "")]
        postal_code: String,

        #[arg(long, default_value = "")]
        country: String,
    },

    /// Check card provider health
    Health,

    /// Maximum borrowable amount against collateral
    MaxAmount {
        #[arg(long)]
        principal: Decimal,

        /// Loan-to-value rate in percent
        #[arg(long)]
        rate: Decimal,

        /// Amount to check against the maximum
        #[arg(long)]
        requested: Option<Decimal>,
    },

    /// Convert crypto to fiat
    Convert {
        #[arg(long)]
        asset: String,

        #[arg(long)]
        amount: Decimal,

        #[arg(long, default_value = "USD")]
        fiat: String,

        /// Simulated duration of each conversion step
        #[arg(long, default_value = "250")]
        step_ms: u64,
    },

    /// Convert between fiat currencies using live rates
    Fx {
        amount: Decimal,

        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = ApiConfig::from_env().context("failed to load configuration")?;
    info!(backend = %config.backend, in_memory = config.uses_in_memory_provider(), "cardflow starting");
    let state = Arc::new(AppState::from_config(config).context("failed to build providers")?);

    if let Err(error) = run(cli, state).await {
        // Service errors already carry a user-facing message
        if let Some(service_error) = error.downcast_ref::<ServiceError>() {
            eprintln!("Error: {}", service_error.user_message());
            std::process::exit(1);
        }
        return Err(error);
    }
    Ok(())
}

async fn run(cli: Cli, state: Arc<AppState>) -> Result<()> {
    let cards = CardService::new(state.clone());
    let currency = CurrencyContext::new(&state.config.base_currency);

    match cli.command {
        Commands::List { status, card_type } => {
            let filter = CardFilter::parse(&status, &card_type)?;
            let list = cards.filtered_cards(&filter).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else if list.is_empty() {
                println!("No cards match the current filter");
            } else {
                let now = chrono::Utc::now();
                for card in &list {
                    println!(
                        "{}  {}  {:<8} {:<7} {:>14} {}",
                        card.id,
                        card.masked_number,
                        card.card_type.as_str(),
                        card.effective_status(now).as_str(),
                        format_money(card.balance, &card.currency, true),
                        card.card_holder_name,
                    );
                }
            }
        }
        Commands::Stats => {
            let stats = cards.stats().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Total cards:    {}", stats.total_cards);
                println!("Active cards:   {}", stats.active_cards);
                println!("Virtual cards:  {}", stats.virtual_cards);
                println!("Physical cards: {}", stats.physical_cards);
                println!("Total balance:  {}", currency.format_amount(stats.total_balance, true));
            }
        }
        Commands::Issue { holder, card_type, sub_type, limit, daily_limit, currency, account } => {
            let request = IssueCardRequest {
                card_type,
                card_sub_type: sub_type,
                card_holder_name: holder,
                spending_limit: limit,
                daily_limit,
                currency: currency.to_ascii_uppercase(),
                linked_account_id: account,
            };
            let card = cards.issue_card(request).await?;
            print_card(&card, cli.json)?;
        }
        Commands::Toggle { card_id } => {
            let card = cards.toggle_card(card_id).await?;
            println!("Card {} is now {}", card.masked_number, card.status);
        }
        Commands::Limits { card_id, monthly, daily } => {
            let card = cards
                .update_spending_limits(card_id, SpendingLimits::new(monthly, daily))
                .await?;
            print_card(&card, cli.json)?;
        }
        Commands::OrderPhysical { card_id, line1, line2, city, state: region, postal_code, country } => {
            let address = ShippingAddress { line1, line2, city, state: region, postal_code, country };
            let fulfillment = FulfillmentService::new(state.clone());
            match fulfillment.order_physical_card(card_id, address).await? {
                FulfillmentOutcome::CheckoutRequired { session_id, url } => {
                    println!("Complete payment to order the card: {}", url);
                    println!("Checkout session: {}", session_id);
                }
                FulfillmentOutcome::Ordered(card) => {
                    println!(
                        "Physical card ordered, tracking number {}",
                        card.tracking_number.as_deref().unwrap_or("pending")
                    );
                }
            }
        }
        Commands::Health => {
            let monitor = HealthMonitor::start(state.cards.clone(), state.config.health_poll_interval);
            let report = monitor.first_report().await;
            match (report.value, report.error) {
                (Some(report), None) => println!(
                    "{} {} ({})",
                    if report.ok { "healthy" } else { "degraded" },
                    report.message,
                    report.project_id.as_deref().unwrap_or("-")
                ),
                (_, Some(error)) => anyhow::bail!("health check failed: {}", error),
                (None, None) => anyhow::bail!("health check returned no result"),
            }
        }
        Commands::MaxAmount { principal, rate, requested } => {
            let quote = CollateralQuote::new(principal, rate)?;
            println!("Maximum amount: {}", quote.display_maximum());
            if let Some(requested) = requested {
                quote.check(requested)?;
                println!("Requested amount {} is within the maximum", requested);
            }
        }
        Commands::Convert { asset, amount, fiat, step_ms } => {
            let quote = RateTable::default().quote(&asset, amount, &fiat)?;
            println!(
                "{} {} = {} {}",
                quote.amount,
                quote.asset,
                format_money(quote.fiat_amount, &quote.fiat, true),
                quote.fiat
            );

            let executor = Arc::new(TimedExecutor::new(Duration::from_millis(step_ms)));
            let handle = ConversionRunner::start(ConversionFlow::new(quote), executor);
            let mut progress = handle.progress();
            let watcher = tokio::spawn(async move {
                while progress.changed().await.is_ok() {
                    let flow = progress.borrow_and_update().clone();
                    println!("[{:>3}%] {}", flow.progress_percent(), flow.step());
                }
            });

            let flow = handle.wait().await?;
            let _ = watcher.await;
            info!(step = %flow.step(), "conversion done");
        }
        Commands::Fx { amount, from, to } => {
            let mut context = CurrencyContext::new(&state.config.base_currency);
            context.start_polling(state.rates.clone(), state.config.rate_poll_interval);
            if let Some(ready) = context.rates_ready().await {
                if let Some(error) = ready.error {
                    anyhow::bail!("could not load exchange rates: {}", error);
                }
            }
            let converted = context.convert(amount, &from, &to)?;
            println!(
                "{} = {}",
                format_money(amount, &from, true),
                format_money(converted, &to, true)
            );
        }
    }

    Ok(())
}

fn print_card(card: &cardflow::Card, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(card)?);
    } else {
        println!("Card:      {}", card.masked_number);
        println!("ID:        {}", card.id);
        println!("Holder:    {}", card.card_holder_name);
        println!("Type:      {} {}", card.card_type, card.card_sub_type);
        println!("Status:    {}", card.status);
        println!("Limits:    {} monthly / {} daily", card.spending_limit, card.daily_limit);
        println!("Expires:   {:02}/{}", card.expiry_month, card.expiry_year);
    }
    Ok(())
}

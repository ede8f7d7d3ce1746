//! Tests for the local card lifecycle rules

use std::str::FromStr;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;

use cardflow::card::IssueCardRequest;
use cardflow::conversion::{ConversionEvent, ConversionFlow, ConversionStep, RateTable};
use cardflow::limits::{check_requested_amount, max_amount, CollateralQuote};
use cardflow::{
    Card, CardFilter, CardStats, CardStatus, CardSubType, CardType, Error, MembershipTier,
    Selection, ShippingAddress, SpendingLimits, ToggleAction,
};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn card(status: CardStatus, card_type: CardType, balance: &str) -> Card {
    let request = IssueCardRequest {
        card_type,
        card_sub_type: CardSubType::Debit,
        card_holder_name: "Jane Doe".to_string(),
        spending_limit: dec("1000"),
        daily_limit: dec("200"),
        currency: "USD".to_string(),
        linked_account_id: None,
    };
    let expires_at = Utc.with_ymd_and_hms(2029, 6, 30, 0, 0, 0).unwrap();
    let mut card = Card::issued(&request, "4000123412341234", expires_at);
    card.status = status;
    card.balance = dec(balance);
    card
}

fn sample_cards() -> Vec<Card> {
    vec![
        card(CardStatus::Active, CardType::Virtual, "120.50"),
        card(CardStatus::Blocked, CardType::Virtual, "10"),
        card(CardStatus::Active, CardType::Physical, "900"),
        card(CardStatus::Issued, CardType::Physical, "0"),
    ]
}

#[test]
fn toggle_blocks_only_active_cards() {
    assert_eq!(ToggleAction::for_status(CardStatus::Active), ToggleAction::Block);
    assert_eq!(ToggleAction::for_status(CardStatus::Blocked), ToggleAction::Unblock);
    assert_eq!(ToggleAction::for_status(CardStatus::Issued), ToggleAction::Unblock);
    assert_eq!(ToggleAction::for_status(CardStatus::Expired), ToggleAction::Unblock);
}

#[test]
fn toggle_reason_only_for_blocks() {
    assert_eq!(ToggleAction::Block.default_reason(), Some("User requested"));
    assert_eq!(ToggleAction::Unblock.default_reason(), None);
    assert_eq!(ToggleAction::Block.target_status(), CardStatus::Blocked);
    assert_eq!(ToggleAction::Unblock.target_status(), CardStatus::Active);
}

#[test]
fn toggling_an_expired_card_is_an_invalid_transition() {
    let mut expired = card(CardStatus::Expired, CardType::Virtual, "0");
    let action = ToggleAction::for_status(expired.status);
    assert_eq!(
        expired.update_status(action.target_status()),
        Err(Error::InvalidTransition { from: CardStatus::Expired, to: CardStatus::Active })
    );
}

#[test]
fn issued_card_activates_then_blocks_and_unblocks() {
    let mut c = card(CardStatus::Issued, CardType::Virtual, "0");
    c.update_status(CardStatus::Active).unwrap();
    c.update_status(CardStatus::Blocked).unwrap();
    c.update_status(CardStatus::Active).unwrap();
    c.update_status(CardStatus::Expired).unwrap();
    assert_eq!(c.status, CardStatus::Expired);
}

#[test]
fn tier_maximums() {
    let expected = [3, 5, 8, 15, 20];
    for (tier, max) in MembershipTier::ALL.iter().zip(expected) {
        assert_eq!(tier.max_cards(), max);
        assert!(tier.can_issue(max - 1));
        assert!(!tier.can_issue(max));
        assert!(!tier.can_issue(max + 4));
    }
}

#[test]
fn computed_maximum_matches_formula() {
    for (principal, rate, expected) in [
        ("10000", "0", "0"),
        ("10000", "50", "5000"),
        ("10000", "100", "10000"),
        ("2500.75", "65", "1625.4875"),
    ] {
        assert_eq!(max_amount(dec(principal), dec(rate)).unwrap(), dec(expected));
    }
}

#[test]
fn amount_above_maximum_is_rejected() {
    assert!(check_requested_amount(dec("5000"), dec("10000"), dec("50")).is_ok());
    assert_eq!(
        check_requested_amount(dec("5000.01"), dec("10000"), dec("50")),
        Err(Error::AmountExceedsMaximum { requested: dec("5000.01"), maximum: dec("5000") })
    );

    let quote = CollateralQuote::new(dec("1234.567"), dec("75")).unwrap();
    assert_eq!(quote.display_maximum(), "925.93");
    assert!(quote.check(dec("926")).is_err());
}

#[test]
fn all_filter_returns_everything() {
    let cards = sample_cards();
    let filtered = CardFilter::default().apply(&cards);
    assert_eq!(filtered, cards);
}

#[test]
fn filter_with_no_match_returns_empty() {
    let cards = sample_cards();
    let filter = CardFilter::new(Selection::Only(CardStatus::Expired), Selection::All);
    assert!(filter.apply(&cards).is_empty());

    let filter = CardFilter::parse("blocked", "physical").unwrap();
    assert!(filter.apply(&cards).is_empty());
}

#[test]
fn filter_is_conjunctive() {
    let cards = sample_cards();
    let filter = CardFilter::parse("active", "virtual").unwrap();
    let filtered = filter.apply(&cards);
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].id, cards[0].id);

    assert!(CardFilter::parse("frozen", "all").is_err());
}

#[test]
fn stats_aggregate_unfiltered_collection() {
    let stats = CardStats::from_cards(&sample_cards());
    assert_eq!(stats.total_cards, 4);
    assert_eq!(stats.active_cards, 2);
    assert_eq!(stats.virtual_cards, 2);
    assert_eq!(stats.physical_cards, 2);
    assert_eq!(stats.total_balance, dec("1030.50"));
    assert_eq!(CardStats::from_cards(&[]), CardStats::default());
}

#[test]
fn address_validation_names_every_missing_field() {
    let address = ShippingAddress {
        line1: "1 Main St".to_string(),
        line2: None,
        city: "  ".to_string(),
        state: String::new(),
        postal_code: "10001".to_string(),
        country: String::new(),
    };
    let err = address.validate().unwrap_err();
    assert_eq!(err, Error::MissingFields(vec!["city", "state", "country"]));
    assert_eq!(err.to_string(), "Missing required fields: city, state, country");

    let complete = ShippingAddress {
        city: "New York".to_string(),
        state: "NY".to_string(),
        country: "us".to_string(),
        ..address
    };
    assert!(complete.validate().is_ok());
    assert_eq!(complete.normalized().country, "US");
}

#[test]
fn spending_limits_are_bounded() {
    assert!(SpendingLimits::new(dec("1000"), dec("200")).validate().is_ok());
    assert!(SpendingLimits::new(dec("-1"), dec("0")).validate().is_err());
    assert!(SpendingLimits::new(dec("100"), dec("200")).validate().is_err());
}

#[test]
fn conversion_runs_through_every_step() {
    let quote = RateTable::default().quote("ETH", dec("2"), "USD").unwrap();
    let mut flow = ConversionFlow::new(quote);
    assert_eq!(flow.progress_percent(), 0);

    let mut seen = Vec::new();
    while !flow.is_finished() {
        seen.push(flow.apply(ConversionEvent::StepCompleted).unwrap().clone());
    }
    assert_eq!(
        seen,
        vec![
            ConversionStep::Validating,
            ConversionStep::Converting,
            ConversionStep::Settling,
            ConversionStep::Completed,
        ]
    );
    assert_eq!(flow.progress_percent(), 100);
    assert!(flow.apply(ConversionEvent::StepCompleted).is_err());
}

#[test]
fn failed_conversion_keeps_progress_and_stops() {
    let quote = RateTable::default().quote("SOL", dec("10"), "GBP").unwrap();
    let mut flow = ConversionFlow::new(quote);
    flow.apply(ConversionEvent::StepCompleted).unwrap();
    flow.apply(ConversionEvent::StepFailed("insufficient liquidity".to_string())).unwrap();

    assert_eq!(flow.step(), &ConversionStep::Failed("insufficient liquidity".to_string()));
    assert_eq!(flow.progress_percent(), 25);
    assert!(flow.apply(ConversionEvent::Cancel).is_err());
}

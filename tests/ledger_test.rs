mod common;

use anyhow::Result;
use balance_ledger::domain::Operation;
use balance_ledger::LedgerError;
use common::{ledger_rows, test_service};

#[tokio::test]
async fn test_account_without_entries_has_zero_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;

    assert_eq!(service.ledger_balance(42).await?, 0);
    assert_eq!(service.balance(42, "RUB").await?.to_string(), "0.00");

    Ok(())
}

#[tokio::test]
async fn test_balance_is_running_sum_of_entries() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let amounts = [10000, -2550, 400, -7850, 125];
    let mut expected = 0;
    for amount in amounts {
        service.record(1, amount, None).await?;
        expected += amount;
        assert_eq!(service.ledger_balance(1).await?, expected);
    }

    assert_eq!(expected, 125);
    Ok(())
}

#[tokio::test]
async fn test_operation_tag_follows_sign() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let income = service.record(1, 500, Some("salary".into())).await?;
    let outcome = service.record(1, -200, None).await?;

    assert_eq!(income.operation, Operation::Income);
    assert_eq!(income.description, "salary");
    assert_eq!(outcome.operation, Operation::Outcome);
    assert!(outcome.id > income.id, "ids must increase");
    Ok(())
}

#[tokio::test]
async fn test_overdraw_is_rejected_without_writing() -> Result<()> {
    let (service, _temp) = test_service().await?;

    service.record(1, 10000, None).await?;
    let err = service.record(1, -10001, None).await.unwrap_err();

    match err {
        LedgerError::InsufficientFunds {
            account,
            balance,
            required,
        } => {
            assert_eq!(account, 1);
            assert_eq!(balance, 10000);
            assert_eq!(required, 10001);
        }
        other => panic!("expected InsufficientFunds, got {other:?}"),
    }

    assert_eq!(service.ledger_balance(1).await?, 10000);
    assert_eq!(ledger_rows(&service).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_withdraw_exact_balance_leaves_zero() -> Result<()> {
    let (service, _temp) = test_service().await?;

    service.deposit(7, 2500, None).await?;
    service.withdraw(7, 2500, Some("close out".into())).await?;

    assert_eq!(service.ledger_balance(7).await?, 0);
    assert!(matches!(
        service.withdraw(7, 1, None).await,
        Err(LedgerError::InsufficientFunds { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_invalid_inputs_are_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;

    assert!(matches!(
        service.record(1, 0, None).await,
        Err(LedgerError::InvalidAmount(_))
    ));
    assert!(matches!(
        service.record(0, 100, None).await,
        Err(LedgerError::InvalidAccount(0))
    ));
    assert!(matches!(
        service.record(-3, 100, None).await,
        Err(LedgerError::InvalidAccount(-3))
    ));
    assert!(matches!(
        service.deposit(1, -100, None).await,
        Err(LedgerError::InvalidAmount(_))
    ));

    assert_eq!(ledger_rows(&service).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_repeated_reads_are_identical() -> Result<()> {
    let (service, _temp) = test_service().await?;

    service.record(3, 12345, None).await?;
    service.record(3, -345, None).await?;

    let first = service.balance(3, "RUB").await?;
    for _ in 0..5 {
        assert_eq!(service.balance(3, "RUB").await?, first);
    }
    Ok(())
}

#[tokio::test]
async fn test_entries_are_immutable_in_the_store() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let entry = service.record(1, 1000, None).await?;
    let pool = service.repository().pool();

    let update = sqlx::query("UPDATE transactions SET sum = 999999 WHERE id = ?")
        .bind(entry.id)
        .execute(pool)
        .await;
    assert!(update.is_err(), "updates must be refused");

    let delete = sqlx::query("DELETE FROM transactions WHERE id = ?")
        .bind(entry.id)
        .execute(pool)
        .await;
    assert!(delete.is_err(), "deletes must be refused");

    assert_eq!(service.ledger_balance(1).await?, 1000);
    Ok(())
}

#[tokio::test]
async fn test_account_info() -> Result<()> {
    let (service, _temp) = test_service().await?;

    service.record(5, 300, None).await?;
    service.record(5, -100, None).await?;

    let info = service.account_info(5).await?;
    assert_eq!(info.balance, 200);
    assert_eq!(info.entry_count, 2);
    Ok(())
}

#[tokio::test]
async fn test_credit_past_balance_range_is_refused() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service.record(1, i64::MAX - 10, None).await?;

    let result = service.record(1, 100, None).await;
    assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));

    // The account stays readable and writable.
    assert_eq!(service.ledger_balance(1).await?, i64::MAX - 10);
    service.record(1, -5, None).await?;
    assert_eq!(service.ledger_balance(1).await?, i64::MAX - 15);
    assert_eq!(ledger_rows(&service).await?, 2);

    Ok(())
}

#[tokio::test]
async fn test_transfer_credit_past_balance_range_is_refused() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service.record(1, i64::MAX - 10, None).await?;
    service.record(2, 100, None).await?;

    let result = service.transfer(2, 1, 100).await;
    assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));

    // The debit on the sender was rolled back with the refused credit.
    assert_eq!(service.ledger_balance(2).await?, 100);
    assert_eq!(service.ledger_balance(1).await?, i64::MAX - 10);
    assert_eq!(ledger_rows(&service).await?, 2);

    service.transfer(1, 2, 10).await?;
    assert_eq!(service.ledger_balance(2).await?, 110);

    Ok(())
}

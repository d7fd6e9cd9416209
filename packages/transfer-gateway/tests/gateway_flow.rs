//! Gateway pair flow tests
//!
//! Drive the sidechain gateway and the mock mainnet together without any
//! oracle process: the test plays every validator and user by hand.

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use std::collections::HashSet;
use std::sync::Arc;

use transfer_gateway::rate_limit::DEFAULT_WINDOW_SECS;
use transfer_gateway::testing::{
    clear_receipt_as, submit_deposit_as, test_validator_keys, test_validator_set, MockMainnet,
    TestUser,
};
use transfer_gateway::{
    quorum_for, sign_withdrawal, ClearOutcome, DepositOutcome, GatewayError, GatewayParams,
    MemoryStore, RateLimitConfig, ReceiptState, SidechainGateway, TokenDescriptor, TokenValue,
    ValidatorSet, WithdrawalReceipt,
};

const GATEWAY: Address = Address::new([0x99; 20]);
const GOLD: Address = Address::new([0x60; 20]);
const CARDS: Address = Address::new([0x61; 20]);
const NOW: u64 = 1_700_000_000;

struct TestContext {
    sidechain: SidechainGateway,
    mainnet: MockMainnet,
    keys: Vec<PrivateKeySigner>,
    user: TestUser,
}

impl TestContext {
    fn user(&self) -> Address {
        self.user.sidechain_address()
    }

    /// Collect quorum shares for the outstanding receipt
    async fn sign_quorum(&self) {
        let receipt = self.sidechain.receipt(&self.user()).await.unwrap();
        let payload = receipt.payload_hash(&GATEWAY);
        for key in &self.keys[..quorum_for(self.keys.len())] {
            let sig = sign_withdrawal(key, &payload).unwrap();
            self.sidechain
                .submit_signature(self.user(), key.address(), &sig)
                .await
                .unwrap();
        }
    }
}

async fn setup_with(validators: usize, params: GatewayParams) -> TestContext {
    let (set, keys) = test_validator_set(validators).unwrap();
    let mainnet = MockMainnet::new(GATEWAY, set.clone());
    let sidechain = SidechainGateway::open(
        params,
        set,
        Arc::new(MemoryStore::new()),
        Arc::new(mainnet.clone()),
    )
    .await
    .unwrap();
    let user = TestUser::new(1).unwrap();
    user.map_identity(&sidechain).await.unwrap();
    TestContext {
        sidechain,
        mainnet,
        keys,
        user,
    }
}

async fn setup(validators: usize, limits: RateLimitConfig) -> TestContext {
    setup_with(
        validators,
        GatewayParams {
            rate_limits: limits,
            min_confirmations: 2,
            ..GatewayParams::new(GATEWAY)
        },
    )
    .await
}

async fn deposit_and_credit(ctx: &TestContext, amount: u64) {
    let record = ctx
        .mainnet
        .deposit(
            ctx.user.mainnet_address(),
            TokenDescriptor::eth(),
            TokenValue::amount(U256::from(amount)),
        )
        .await
        .unwrap();
    ctx.mainnet.mine(2).await;
    for key in &ctx.keys {
        submit_deposit_as(&ctx.sidechain, key, record.clone())
            .await
            .unwrap();
    }
}

async fn withdraw_eth(ctx: &TestContext, amount: u64) -> Result<WithdrawalReceipt, GatewayError> {
    ctx.user
        .request_withdrawal(
            &ctx.sidechain,
            TokenDescriptor::eth(),
            TokenValue::amount(U256::from(amount)),
            NOW,
        )
        .await
}

#[tokio::test]
async fn test_round_trip_has_zero_net_change() {
    let ctx = setup(4, RateLimitConfig::default()).await;
    let amount = 1_000u64;
    let eth = TokenDescriptor::eth();

    deposit_and_credit(&ctx, amount).await;
    assert_eq!(ctx.sidechain.balance(ctx.user(), &eth, U256::ZERO).await, U256::from(amount));
    assert_eq!(ctx.mainnet.escrow_of(&eth, U256::ZERO).await, U256::from(amount));

    withdraw_eth(&ctx, amount).await.unwrap();
    ctx.sign_quorum().await;

    let auth = ctx.sidechain.withdrawal_authorization(&ctx.user()).await.unwrap();
    assert_eq!(auth.receipt.state, ReceiptState::Signed);
    let released = ctx.mainnet.release_authorized(&auth).await.unwrap();
    assert_eq!(released.value.amount, U256::from(amount));
    assert_eq!(released.recipient, ctx.user.mainnet_address());
    assert_eq!(ctx.mainnet.escrow_of(&eth, U256::ZERO).await, U256::ZERO);

    assert_eq!(
        clear_receipt_as(&ctx.sidechain, &ctx.keys[0], ctx.user(), released.nonce)
            .await
            .unwrap(),
        ClearOutcome::Cleared
    );
    assert_eq!(ctx.sidechain.balance(ctx.user(), &eth, U256::ZERO).await, U256::ZERO);
    assert!(ctx.sidechain.receipt(&ctx.user()).await.is_none());

    // Replaying the same authorization is refused on mainnet
    assert_eq!(
        ctx.mainnet.release_authorized(&auth).await.unwrap_err(),
        GatewayError::NonceReplayed {
            owner: ctx.user.mainnet_address(),
            nonce: released.nonce
        }
    );
}

#[tokio::test]
async fn test_quorum_threshold_for_every_set_size() {
    for n in 1..=10usize {
        let ctx = setup(n, RateLimitConfig::default()).await;
        deposit_and_credit(&ctx, 10).await;
        let receipt = withdraw_eth(&ctx, 10).await.unwrap();
        let payload = receipt.payload_hash(&GATEWAY);
        let quorum = quorum_for(n);
        assert_eq!(quorum, (2 * n + 2) / 3);

        for (i, key) in ctx.keys.iter().enumerate().take(quorum) {
            let sig = sign_withdrawal(key, &payload).unwrap();
            let state = ctx
                .sidechain
                .submit_signature(ctx.user(), key.address(), &sig)
                .await
                .unwrap();
            if i + 1 < quorum {
                assert_eq!(state, ReceiptState::Pending, "n={} after {} shares", n, i + 1);
            } else {
                assert_eq!(state, ReceiptState::Signed, "n={} at quorum", n);
            }
        }

        // One share short of quorum does not release on mainnet
        if quorum > 1 {
            let auth = ctx.sidechain.withdrawal_authorization(&ctx.user()).await.unwrap();
            let short = &auth.signatures[..(quorum - 1) * 65];
            let r = &auth.receipt;
            assert!(matches!(
                ctx.mainnet
                    .release(r.recipient, r.token, r.value, r.nonce, short, r.validator_set_version)
                    .await,
                Err(GatewayError::QuorumNotMet { .. })
            ));
        }
    }
}

#[tokio::test]
async fn test_rate_limit_ceilings_hold_across_accounts() {
    let limits = RateLimitConfig::uniform(
        DEFAULT_WINDOW_SECS,
        U256::from(1_000u64),
        U256::from(400u64),
    );
    let (set, keys) = test_validator_set(1).unwrap();
    let mainnet = MockMainnet::new(GATEWAY, set.clone());
    let sidechain = SidechainGateway::open(
        GatewayParams {
            rate_limits: limits.clone(),
            min_confirmations: 1,
            ..GatewayParams::new(GATEWAY)
        },
        set,
        Arc::new(MemoryStore::new()),
        Arc::new(mainnet.clone()),
    )
    .await
    .unwrap();

    let users: Vec<TestUser> = (1..=4u8).map(|i| TestUser::new(i).unwrap()).collect();
    for user in &users {
        user.map_identity(&sidechain).await.unwrap();
        let record = mainnet
            .deposit(
                user.mainnet_address(),
                TokenDescriptor::eth(),
                TokenValue::amount(U256::from(1_000u64)),
            )
            .await
            .unwrap();
        submit_deposit_as(&sidechain, &keys[0], record).await.unwrap();
    }

    let mut succeeded_total = U256::ZERO;
    let amounts = [150u64, 300, 100, 250, 200, 90];
    for (round, amount) in amounts.iter().enumerate() {
        for user in &users {
            let result = user
                .request_withdrawal(
                    &sidechain,
                    TokenDescriptor::eth(),
                    TokenValue::amount(U256::from(*amount)),
                    NOW + round as u64,
                )
                .await;
            match result {
                Ok(receipt) => {
                    succeeded_total += U256::from(*amount);
                    clear_receipt_as(&sidechain, &keys[0], user.sidechain_address(), receipt.nonce)
                        .await
                        .unwrap();
                }
                Err(GatewayError::DailyTotalExceeded { .. })
                | Err(GatewayError::DailyAccountExceeded { .. }) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
    }

    let eth = Address::ZERO;
    assert!(succeeded_total <= limits.total_limit);
    for user in &users {
        let (used, total) = sidechain
            .withdrawn_in_window(&user.sidechain_address(), &eth, NOW + 10)
            .await;
        assert!(used <= limits.account_limit);
        assert_eq!(total, succeeded_total);
    }

    // The next window starts from zero
    let next_window = NOW + DEFAULT_WINDOW_SECS;
    let (used, total) = sidechain
        .withdrawn_in_window(&users[0].sidechain_address(), &eth, next_window)
        .await;
    assert_eq!((used, total), (U256::ZERO, U256::ZERO));
}

#[tokio::test]
async fn test_same_deposit_from_two_validators_credits_once() {
    let ctx = setup(4, RateLimitConfig::default()).await;
    let record = ctx
        .mainnet
        .deposit(
            ctx.user.mainnet_address(),
            TokenDescriptor::eth(),
            TokenValue::amount(U256::from(77)),
        )
        .await
        .unwrap();
    ctx.mainnet.mine(2).await;

    let first = submit_deposit_as(&ctx.sidechain, &ctx.keys[0], record.clone())
        .await
        .unwrap();
    let second = submit_deposit_as(&ctx.sidechain, &ctx.keys[1], record)
        .await
        .unwrap();
    assert_eq!(first, DepositOutcome::Credited { balance: U256::from(77) });
    assert_eq!(second, DepositOutcome::AlreadyCredited { balance: U256::from(77) });
}

#[tokio::test]
async fn test_rotation_and_retirement_on_mainnet() {
    let ctx = setup(3, RateLimitConfig::default()).await;
    deposit_and_credit(&ctx, 50).await;
    let receipt = withdraw_eth(&ctx, 50).await.unwrap();

    // Rotation happens while the receipt is in flight
    let next_keys = test_validator_keys(8)[4..].to_vec();
    let next: ValidatorSet = ctx
        .sidechain
        .rotate_validators(next_keys.iter().map(|k| k.address()).collect())
        .await
        .unwrap();
    ctx.mainnet.add_validator_set(next.clone()).await;

    let payload = receipt.payload_hash(&GATEWAY);
    for key in &ctx.keys[..2] {
        ctx.sidechain
            .submit_signature(ctx.user(), key.address(), &sign_withdrawal(key, &payload).unwrap())
            .await
            .unwrap();
    }
    let auth = ctx.sidechain.withdrawal_authorization(&ctx.user()).await.unwrap();
    assert_eq!(auth.receipt.validator_set_version, 1);

    // Once version 1 is retired the old authorization is refused
    ctx.mainnet.retire_validator_sets_below(next.version()).await;
    assert_eq!(
        ctx.mainnet.release_authorized(&auth).await.unwrap_err(),
        GatewayError::UnknownValidatorSet { version: 1 }
    );
}

async fn mintable_setup() -> TestContext {
    let ctx = setup_with(
        4,
        GatewayParams {
            min_confirmations: 2,
            mintable_tokens: HashSet::from([GOLD, CARDS]),
            ..GatewayParams::new(GATEWAY)
        },
    )
    .await;
    ctx.mainnet.register_mintable(GOLD).await;
    ctx.mainnet.register_mintable(CARDS).await;
    ctx
}

#[tokio::test]
async fn test_minted_fungible_withdraws_through_mainnet_mint() {
    let ctx = mintable_setup().await;
    let gold = TokenDescriptor::fungible(GOLD);

    // 30 escrowed by a deposit, 70 created on the sidechain
    let record = ctx
        .mainnet
        .deposit(ctx.user.mainnet_address(), gold, TokenValue::amount(U256::from(30)))
        .await
        .unwrap();
    ctx.mainnet.mine(2).await;
    submit_deposit_as(&ctx.sidechain, &ctx.keys[0], record).await.unwrap();
    ctx.sidechain
        .mint(ctx.user(), gold, TokenValue::amount(U256::from(70)))
        .await
        .unwrap();

    ctx.user
        .request_withdrawal(&ctx.sidechain, gold, TokenValue::amount(U256::from(100)), NOW)
        .await
        .unwrap();
    ctx.sign_quorum().await;
    let auth = ctx.sidechain.withdrawal_authorization(&ctx.user()).await.unwrap();
    let released = ctx.mainnet.release_authorized(&auth).await.unwrap();

    assert_eq!(released.value.amount, U256::from(100));
    assert_eq!(ctx.mainnet.escrow_of(&gold, U256::ZERO).await, U256::ZERO);
    assert_eq!(ctx.mainnet.minted_of(&gold, U256::ZERO).await, U256::from(70));
}

#[tokio::test]
async fn test_minted_token_id_withdraws_through_mainnet_mint() {
    let ctx = mintable_setup().await;
    let cards = TokenDescriptor::non_fungible(CARDS);
    let card = TokenValue::token_id(U256::from(7));

    ctx.sidechain.mint(ctx.user(), cards, card).await.unwrap();
    ctx.user
        .request_withdrawal(&ctx.sidechain, cards, card, NOW)
        .await
        .unwrap();
    ctx.sign_quorum().await;
    let auth = ctx.sidechain.withdrawal_authorization(&ctx.user()).await.unwrap();
    ctx.mainnet.release_authorized(&auth).await.unwrap();
    assert_eq!(ctx.mainnet.minted_of(&cards, U256::from(7)).await, U256::from(1));

    assert_eq!(ctx.mainnet.escrow_of(&cards, U256::from(7)).await, U256::ZERO);
    assert_eq!(
        ctx.sidechain.balance_of(ctx.user(), CARDS, U256::from(7)).await,
        U256::ZERO
    );
}

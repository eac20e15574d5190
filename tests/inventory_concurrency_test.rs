//! Concurrent checkouts against limited stock.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::TestApp;
use futures::future::join_all;
use rust_decimal_macros::dec;

const POOL_SIZE: u32 = 8;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_unit_goes_to_exactly_one_buyer() {
    let app = Arc::new(TestApp::with_connections(POOL_SIZE).await);
    let product_id = app.create_product("Silk Scarf", dec!(100), 1).await;

    let attempts = (0..2).map(|i| {
        let app = app.clone();
        tokio::spawn(async move {
            let txn_id = format!("TXN-LAST-{i}");
            app.place_order(&app.user_token, product_id, 1, dec!(100), Some(&txn_id))
                .await
        })
    });
    let responses: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("order task"))
        .collect();

    let created = responses
        .iter()
        .filter(|r| r.status == StatusCode::CREATED)
        .count();
    let refused: Vec<_> = responses
        .iter()
        .filter(|r| r.status == StatusCode::UNPROCESSABLE_ENTITY)
        .collect();

    assert_eq!(created, 1);
    assert_eq!(refused.len(), 1);
    assert!(refused[0].body["message"]
        .as_str()
        .unwrap_or_default()
        .contains("Insufficient stock for Silk Scarf"));
    assert_eq!(app.product_stock(product_id).await, 0);
    assert_eq!(app.order_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stock_never_oversells_under_contention() {
    const INITIAL_STOCK: i32 = 5;
    const BUYERS: usize = 12;

    let app = Arc::new(TestApp::with_connections(POOL_SIZE).await);
    let product_id = app
        .create_product("Cashmere Sweater", dec!(100), INITIAL_STOCK)
        .await;

    let attempts = (0..BUYERS).map(|i| {
        let app = app.clone();
        tokio::spawn(async move {
            let txn_id = format!("TXN-RUSH-{i}");
            app.place_order(&app.user_token, product_id, 1, dec!(100), Some(&txn_id))
                .await
                .status
        })
    });
    let statuses: Vec<StatusCode> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("order task"))
        .collect();

    let created = statuses.iter().filter(|s| **s == StatusCode::CREATED).count();
    let refused = statuses
        .iter()
        .filter(|s| **s == StatusCode::UNPROCESSABLE_ENTITY)
        .count();

    assert_eq!(created, INITIAL_STOCK as usize);
    assert_eq!(refused, BUYERS - INITIAL_STOCK as usize);
    assert_eq!(app.product_stock(product_id).await, 0);
    assert_eq!(app.order_count().await, INITIAL_STOCK as u64);
}

#[tokio::test]
async fn multi_line_order_is_all_or_nothing() {
    let app = TestApp::new().await;
    let plenty = app.create_product("Canvas Tote", dec!(50), 10).await;
    let scarce = app.create_product("Gold Cufflinks", dec!(100), 1).await;

    let totals = app.state.services.orders.quote(&[
        luxemart_api::services::orders::OrderLineRequest {
            product_id: plenty,
            quantity: 3,
            price: dec!(50),
        },
        luxemart_api::services::orders::OrderLineRequest {
            product_id: scarce,
            quantity: 2,
            price: dec!(100),
        },
    ])
    .expect("quote");
    let body = serde_json::json!({
        "items": [
            { "productId": plenty, "quantity": 3, "price": "50" },
            { "productId": scarce, "quantity": 2, "price": "100" },
        ],
        "totalAmount": totals.total.to_string(),
        "shippingAddress": "4 Park Street, Kolkata",
    });
    let response = app
        .request(
            axum::http::Method::POST,
            "/api/v1/orders",
            Some(&app.user_token),
            Some(body),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.product_stock(plenty).await, 10);
    assert_eq!(app.product_stock(scarce).await, 1);
    assert_eq!(app.order_count().await, 0);
}

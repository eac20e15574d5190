//! Order visibility and administrative fulfilment transitions.

mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use luxemart_api::entities::OrderStatus;
use rstest::rstest;
use rust_decimal_macros::dec;
use serde_json::json;

async fn order_in_status(app: &TestApp, txn_id: &str, status: OrderStatus) -> String {
    let product_id = app.create_product("Leather Satchel", dec!(100), 5).await;
    let created = app
        .place_order(&app.user_token, product_id, 1, dec!(100), Some(txn_id))
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    if status != OrderStatus::Pending {
        app.force_status(txn_id, status).await;
    }
    created.body["data"]["id"].as_str().expect("order id").to_string()
}

#[rstest]
#[case(OrderStatus::Paid, "SHIPPED", StatusCode::OK, OrderStatus::Shipped)]
#[case(OrderStatus::Shipped, "DELIVERED", StatusCode::OK, OrderStatus::Delivered)]
#[case(OrderStatus::Pending, "PAID", StatusCode::BAD_REQUEST, OrderStatus::Pending)]
#[case(OrderStatus::Pending, "SHIPPED", StatusCode::BAD_REQUEST, OrderStatus::Pending)]
#[case(OrderStatus::Paid, "DELIVERED", StatusCode::BAD_REQUEST, OrderStatus::Paid)]
#[case(OrderStatus::Paid, "FAILED", StatusCode::BAD_REQUEST, OrderStatus::Paid)]
#[case(OrderStatus::Failed, "SHIPPED", StatusCode::BAD_REQUEST, OrderStatus::Failed)]
#[case(OrderStatus::Delivered, "SHIPPED", StatusCode::BAD_REQUEST, OrderStatus::Delivered)]
#[case(OrderStatus::Shipped, "PENDING", StatusCode::BAD_REQUEST, OrderStatus::Shipped)]
#[tokio::test]
async fn admin_status_transitions(
    #[case] from: OrderStatus,
    #[case] requested: &str,
    #[case] expected_code: StatusCode,
    #[case] final_status: OrderStatus,
) {
    let app = TestApp::new().await;
    let order_id = order_in_status(&app, "TXN-FLOW", from).await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{order_id}/status"),
            Some(&app.admin_token),
            Some(json!({ "status": requested })),
        )
        .await;

    assert_eq!(response.status, expected_code, "{}", response.body);
    assert_eq!(app.order_status("TXN-FLOW").await, final_status);
    if expected_code == StatusCode::OK {
        assert_eq!(response.body["data"]["status"], requested);
    }
}

#[tokio::test]
async fn customers_cannot_change_status() {
    let app = TestApp::new().await;
    let order_id = order_in_status(&app, "TXN-SELF", OrderStatus::Paid).await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{order_id}/status"),
            Some(&app.user_token),
            Some(json!({ "status": "SHIPPED" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(app.order_status("TXN-SELF").await, OrderStatus::Paid);
}

#[tokio::test]
async fn unknown_order_status_change_is_not_found() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{}/status", uuid::Uuid::new_v4()),
            Some(&app.admin_token),
            Some(json!({ "status": "SHIPPED" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn orders_are_visible_to_owner_and_admin_only() {
    let app = TestApp::new().await;
    let order_id = order_in_status(&app, "TXN-MINE", OrderStatus::Pending).await;
    let other_token = app.add_customer("Kabir Shah", "kabir@example.com").await;

    let own = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{order_id}"),
            Some(&app.user_token),
            None,
        )
        .await;
    assert_eq!(own.status, StatusCode::OK);
    assert!(own.body["data"].get("customer").is_none());

    let stranger = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{order_id}"),
            Some(&other_token),
            None,
        )
        .await;
    assert_eq!(stranger.status, StatusCode::NOT_FOUND);

    let stranger_list = app
        .request(Method::GET, "/api/v1/orders", Some(&other_token), None)
        .await;
    assert_eq!(stranger_list.body["data"].as_array().map(Vec::len), Some(0));

    let admin_list = app
        .request(Method::GET, "/api/v1/orders", Some(&app.admin_token), None)
        .await;
    assert_eq!(admin_list.status, StatusCode::OK);
    let orders = admin_list.body["data"].as_array().expect("orders");
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["customer"]["email"], "asha@example.com");
    assert_eq!(orders[0]["items"][0]["quantity"], 1);
}

#[tokio::test]
async fn customer_orders_are_listed_newest_first() {
    let app = TestApp::new().await;
    let product_id = app.create_product("Silver Ring", dec!(100), 5).await;
    for txn_id in ["TXN-ONE", "TXN-TWO"] {
        let created = app
            .place_order(&app.user_token, product_id, 1, dec!(100), Some(txn_id))
            .await;
        assert_eq!(created.status, StatusCode::CREATED);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let listed = app
        .request(Method::GET, "/api/v1/orders", Some(&app.user_token), None)
        .await;
    let txn_ids: Vec<&str> = listed.body["data"]
        .as_array()
        .expect("orders")
        .iter()
        .filter_map(|o| o["txnId"].as_str())
        .collect();
    assert_eq!(txn_ids, ["TXN-TWO", "TXN-ONE"]);
}

//! Talabat adapter

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::models::{ChangedItem, DeliveryService};
use shared::order::{Customer, Order, OrderItem, OrderItemAttribute, OrderStatus, PaymentInfo};

use super::http::AggregatorHttp;
use super::{AggregatorClient, AggregatorResult, parse_payload, parse_time, require_items};

pub struct TalabatClient {
    http: AggregatorHttp,
}

impl TalabatClient {
    pub fn new(http: AggregatorHttp) -> Self {
        Self { http }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TalabatOrder {
    token: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    expedition_type: String,
    #[serde(default)]
    pre_order: bool,
    #[serde(default)]
    platform_restaurant: TalabatRestaurant,
    #[serde(default)]
    customer: TalabatCustomer,
    #[serde(default)]
    payment: TalabatPayment,
    #[serde(default)]
    price: TalabatPrice,
    #[serde(default)]
    comments: TalabatComments,
    #[serde(default)]
    delivery: TalabatDelivery,
    products: Vec<TalabatProduct>,
}

#[derive(Debug, Default, Deserialize)]
struct TalabatRestaurant {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TalabatCustomer {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    mobile_phone: String,
}

#[derive(Debug, Default, Deserialize)]
struct TalabatPayment {
    #[serde(default, rename = "type")]
    payment_type: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TalabatPrice {
    #[serde(default)]
    grand_total: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TalabatComments {
    #[serde(default)]
    customer_comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TalabatDelivery {
    #[serde(default)]
    rider_pickup_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TalabatProduct {
    remote_code: String,
    name: String,
    quantity: i32,
    #[serde(default)]
    unit_price: f64,
    #[serde(default)]
    selected_toppings: Vec<TalabatTopping>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TalabatTopping {
    remote_code: String,
    name: String,
    #[serde(default = "one")]
    quantity: i32,
    #[serde(default)]
    price: f64,
}

fn one() -> i32 {
    1
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TalabatAvailability<'a> {
    remote_code: &'a str,
    active: bool,
}

fn availability(items: &[ChangedItem]) -> Vec<TalabatAvailability<'_>> {
    items
        .iter()
        .map(|i| TalabatAvailability {
            remote_code: &i.ext_id,
            active: i.is_available,
        })
        .collect()
}

#[async_trait]
impl AggregatorClient for TalabatClient {
    fn delivery(&self) -> DeliveryService {
        DeliveryService::Talabat
    }

    async fn modify_product(
        &self,
        external_store_id: &str,
        product: &ChangedItem,
    ) -> AggregatorResult<()> {
        self.http
            .put(
                &format!("/v2/chains/vendors/{external_store_id}/products/{}", product.ext_id),
                &serde_json::json!({ "active": product.is_available, "price": product.price }),
            )
            .await
    }

    async fn bulk_update(
        &self,
        external_store_id: &str,
        products: &[ChangedItem],
    ) -> AggregatorResult<()> {
        self.http
            .put(
                &format!("/v2/chains/vendors/{external_store_id}/products/availability"),
                &availability(products),
            )
            .await
    }

    async fn bulk_attribute(
        &self,
        external_store_id: &str,
        attributes: &[ChangedItem],
    ) -> AggregatorResult<()> {
        self.http
            .put(
                &format!("/v2/chains/vendors/{external_store_id}/toppings/availability"),
                &availability(attributes),
            )
            .await
    }

    fn order_from_request(&self, payload: &Value) -> AggregatorResult<Order> {
        let raw: TalabatOrder = parse_payload(DeliveryService::Talabat, payload)?;

        let mut order = Order::new(DeliveryService::Talabat, raw.token);
        order.order_code = raw.code;
        order.external_store_id = raw.platform_restaurant.id;
        order.is_preorder = raw.pre_order;
        order.pickup_time = parse_time(raw.delivery.rider_pickup_time.as_deref())?;
        order.is_marketplace = raw.expedition_type == "delivery";
        order.customer = Customer {
            name: format!("{} {}", raw.customer.first_name, raw.customer.last_name)
                .trim()
                .to_string(),
            phone: raw.customer.mobile_phone,
            address: None,
        };
        order.comment = raw.comments.customer_comment;
        order.payment = PaymentInfo {
            method: raw.payment.payment_type.to_lowercase(),
            ..Default::default()
        };
        order.items = raw
            .products
            .into_iter()
            .map(|p| OrderItem {
                id: p.remote_code,
                pos_id: None,
                name: p.name,
                quantity: p.quantity,
                price: p.unit_price,
                attributes: p
                    .selected_toppings
                    .into_iter()
                    .map(|t| OrderItemAttribute {
                        id: t.remote_code,
                        pos_id: None,
                        name: t.name,
                        quantity: t.quantity,
                        price: t.price,
                    })
                    .collect(),
            })
            .collect();
        order.total = raw.price.grand_total;
        require_items(&order)?;
        Ok(order)
    }

    fn map_system_status_to_aggregator_status(&self, status: OrderStatus) -> Option<&'static str> {
        match status {
            OrderStatus::Accepted => Some("order_accepted"),
            OrderStatus::ReadyForPickup | OrderStatus::CookingComplete => Some("order_prepared"),
            OrderStatus::Closed => Some("order_picked_up"),
            OrderStatus::CancelledByPosSystem | OrderStatus::Failed => Some("order_rejected"),
            _ => None,
        }
    }

    async fn update_order_in_aggregator(
        &self,
        order: &Order,
        status: OrderStatus,
    ) -> AggregatorResult<()> {
        let Some(talabat_status) = self.map_system_status_to_aggregator_status(status) else {
            return Ok(());
        };
        self.http
            .post(
                &format!("/v2/order/status/{}", order.order_id),
                &serde_json::json!({ "status": talabat_status }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Endpoint;
    use serde_json::json;
    use std::time::Duration;

    fn client() -> TalabatClient {
        let endpoint = Endpoint {
            base_url: "https://talabat.invalid".into(),
            token: None,
        };
        TalabatClient::new(
            AggregatorHttp::new(DeliveryService::Talabat, endpoint, Duration::from_secs(1))
                .unwrap(),
        )
    }

    #[test]
    fn test_order_from_request() {
        let payload = json!({
            "token": "tb-1",
            "code": "C1",
            "expeditionType": "pickup",
            "platformRestaurant": {"id": "t-store"},
            "customer": {"firstName": "Omar", "lastName": "", "mobilePhone": "+971"},
            "payment": {"type": "Cash"},
            "price": {"grandTotal": 30.0},
            "products": [{"remoteCode": "p1", "name": "Shawarma", "quantity": 2, "unitPrice": 15.0,
                          "selectedToppings": [{"remoteCode": "t1", "name": "Garlic"}]}]
        });
        let order = client().order_from_request(&payload).unwrap();
        assert_eq!(order.order_id, "tb-1");
        assert_eq!(order.customer.name, "Omar");
        assert!(!order.is_marketplace);
        assert_eq!(order.payment.method, "cash");
        assert_eq!(order.items[0].attributes[0].id, "t1");
    }
}

//! iiko Cloud API adapter
//!
//! Syrve is the international brand of the same platform and speaks the
//! same protocol; only the endpoint differs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::models::{Attribute, Menu, PosType, Product, Store};
use shared::order::{Order, OrderStatus};

use super::http::PosHttp;
use super::{PosClient, PosError, PosResult};

pub struct IikoClient {
    http: PosHttp,
}

impl IikoClient {
    pub fn new(http: PosHttp) -> Self {
        Self { http }
    }
}

// ========== Wire types ==========

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateDelivery<'a> {
    organization_id: &'a str,
    terminal_group_id: &'a str,
    order: IikoOrder<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IikoOrder<'a> {
    external_number: &'a str,
    phone: &'a str,
    customer: IikoCustomer<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    complete_before: Option<String>,
    items: Vec<IikoItem<'a>>,
    payments: Vec<IikoPayment<'a>>,
}

#[derive(Serialize)]
struct IikoCustomer<'a> {
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IikoItem<'a> {
    product_id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    amount: i32,
    price: f64,
    modifiers: Vec<IikoModifier<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IikoModifier<'a> {
    product_id: &'a str,
    amount: i32,
    price: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IikoPayment<'a> {
    payment_type_kind: &'static str,
    sum: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_type_id: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDeliveryResponse {
    order_info: OrderInfo,
}

#[derive(Deserialize)]
struct OrderInfo {
    id: String,
    #[serde(default)]
    order: Option<IikoOrderState>,
}

#[derive(Deserialize)]
struct IikoOrderState {
    status: String,
}

#[derive(Deserialize)]
struct DeliveriesById {
    orders: Vec<OrderInfo>,
}

#[derive(Deserialize)]
struct Nomenclature {
    #[serde(default)]
    products: Vec<NomenclatureProduct>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NomenclatureProduct {
    id: String,
    name: String,
    /// `Dish` | `Modifier` | `Good`
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    is_deleted: bool,
    #[serde(default)]
    parent_group: Option<String>,
    #[serde(default)]
    size_prices: Vec<SizePrice>,
    #[serde(default)]
    group_modifiers: Vec<GroupModifier>,
}

#[derive(Deserialize)]
struct SizePrice {
    price: PriceValue,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceValue {
    #[serde(default)]
    current_price: f64,
}

#[derive(Deserialize)]
struct GroupModifier {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopLists {
    #[serde(default)]
    terminal_group_stop_lists: Vec<OrganizationStopList>,
}

#[derive(Deserialize)]
struct OrganizationStopList {
    #[serde(default)]
    items: Vec<TerminalStopList>,
}

#[derive(Deserialize)]
struct TerminalStopList {
    #[serde(default)]
    items: Vec<StopListEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopListEntry {
    product_id: String,
    #[serde(default)]
    balance: f64,
}

fn build_order<'a>(store: &'a Store, order: &'a Order) -> CreateDelivery<'a> {
    let items = order
        .items
        .iter()
        .map(|item| IikoItem {
            product_id: item.pos_id.as_deref().unwrap_or(&item.id),
            kind: "Product",
            amount: item.quantity,
            price: item.price,
            modifiers: item
                .attributes
                .iter()
                .map(|a| IikoModifier {
                    product_id: a.pos_id.as_deref().unwrap_or(&a.id),
                    amount: a.quantity,
                    price: a.price,
                })
                .collect(),
        })
        .collect();

    let payment_kind = if order.payment.method == "cash" {
        "Cash"
    } else {
        "Card"
    };

    CreateDelivery {
        organization_id: &store.pos.organization_id,
        terminal_group_id: &store.pos.terminal_id,
        order: IikoOrder {
            external_number: &order.order_id,
            phone: &order.customer.phone,
            customer: IikoCustomer {
                name: &order.customer.name,
            },
            comment: order.comment.as_deref(),
            complete_before: order
                .pickup_time
                .and_then(chrono::DateTime::from_timestamp_millis)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string()),
            items,
            payments: vec![IikoPayment {
                payment_type_kind: payment_kind,
                sum: order.total,
                payment_type_id: order.payment.payment_type_id.as_deref(),
            }],
        },
    }
}

fn build_menu(store: &Store, nomenclature: Nomenclature, stop_lists: StopLists) -> Menu {
    let mut menu = Menu {
        id: store.pos_menu_id.clone(),
        name: format!("{} POS", store.name),
        ..Default::default()
    };

    for p in nomenclature.products {
        let price = p
            .size_prices
            .first()
            .map(|s| s.price.current_price)
            .unwrap_or_default();
        if p.kind == "Modifier" {
            let mut attribute = Attribute::new(p.id, p.name);
            attribute.price = price;
            attribute.is_deleted = p.is_deleted;
            attribute.attribute_group_id = p.parent_group;
            menu.attributes.push(attribute);
        } else {
            let mut product = Product::new(p.id, p.name);
            product.price = price;
            product.is_deleted = p.is_deleted;
            product.section_id = p.parent_group;
            product.attribute_group_ids = p.group_modifiers.into_iter().map(|g| g.id).collect();
            menu.products.push(product);
        }
    }

    menu.stop_lists = stop_lists
        .terminal_group_stop_lists
        .into_iter()
        .flat_map(|o| o.items)
        .flat_map(|t| t.items)
        .filter(|e| e.balance <= 0.0)
        .map(|e| e.product_id)
        .collect();
    menu
}

#[async_trait]
impl PosClient for IikoClient {
    fn pos_type(&self) -> PosType {
        self.http.pos()
    }

    async fn get_menu(&self, store: &Store) -> PosResult<Menu> {
        let organization = serde_json::json!({ "organizationId": store.pos.organization_id });
        let organizations = serde_json::json!({ "organizationIds": [store.pos.organization_id] });
        let (nomenclature, stop_lists) = tokio::try_join!(
            self.http
                .post::<_, Nomenclature>(store, "/api/1/nomenclature", &organization),
            self.http
                .post::<_, StopLists>(store, "/api/1/stop_lists", &organizations),
        )?;
        Ok(build_menu(store, nomenclature, stop_lists))
    }

    async fn create_order(&self, store: &Store, order: &Order) -> PosResult<String> {
        let response: CreateDeliveryResponse = self
            .http
            .post(store, "/api/1/deliveries/create", &build_order(store, order))
            .await?;
        Ok(response.order_info.id)
    }

    async fn get_order_status(&self, store: &Store, pos_order_id: &str) -> PosResult<String> {
        let body = serde_json::json!({
            "organizationId": store.pos.organization_id,
            "orderIds": [pos_order_id],
        });
        let response: DeliveriesById = self
            .http
            .post(store, "/api/1/deliveries/by_id", &body)
            .await?;
        response
            .orders
            .into_iter()
            .find(|o| o.id == pos_order_id)
            .and_then(|o| o.order)
            .map(|o| o.status)
            .ok_or_else(|| PosError::InvalidResponse(format!("order {pos_order_id} not returned")))
    }

    fn map_pos_status_to_system_status(&self, pos_status: &str) -> Option<OrderStatus> {
        match pos_status {
            "Unconfirmed" | "WaitCooking" | "ReadyForCooking" => Some(OrderStatus::Accepted),
            "CookingStarted" => Some(OrderStatus::CookingStarted),
            "CookingCompleted" => Some(OrderStatus::CookingComplete),
            "Waiting" => Some(OrderStatus::ReadyForPickup),
            "OnWay" => Some(OrderStatus::OutForDelivery),
            "Delivered" | "Closed" => Some(OrderStatus::Closed),
            "Cancelled" => Some(OrderStatus::CancelledByPosSystem),
            _ => None,
        }
    }

    async fn cancel_order(
        &self,
        store: &Store,
        pos_order_id: &str,
        reason: &str,
    ) -> PosResult<()> {
        let body = serde_json::json!({
            "organizationId": store.pos.organization_id,
            "orderId": pos_order_id,
            "cancelCause": reason,
        });
        self.http
            .post::<_, serde_json::Value>(store, "/api/1/deliveries/cancel", &body)
            .await?;
        Ok(())
    }
}

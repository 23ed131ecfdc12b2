use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use recarga_core::domain::catalog::{
    CustomField, CustomFieldId, Offer, OfferDraft, OfferId, PaymentMethod, PaymentMethodDraft,
    PaymentMethodId, PaymentMethodType, Product, ProductDraft, ProductId,
};
use recarga_core::domain::dialog::{OfferUpdate, OperatorDialog};
use recarga_core::domain::order::{Order, OrderId, OrderStatus};
use recarga_core::domain::session::Session;

use super::{
    CatalogRepository, CompletionOutcome, DialogRepository, OrderRepository, RepositoryError,
    SessionRepository,
};

#[derive(Default)]
struct CatalogState {
    next_id: i64,
    products: Vec<Product>,
    offers: Vec<Offer>,
    methods: Vec<PaymentMethod>,
    fields: Vec<CustomField>,
}

impl CatalogState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct InMemoryCatalogRepository {
    state: RwLock<CatalogState>,
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let state = self.state.read().await;
        let mut products = state.products.clone();
        products.sort_by_key(|p| p.menu_index);
        Ok(products)
    }

    async fn product_by_index(&self, menu_index: u32) -> Result<Option<Product>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.products.iter().find(|p| p.menu_index == menu_index).cloned())
    }

    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.products.iter().find(|p| p.id == id).cloned())
    }

    async fn create_product(&self, draft: ProductDraft) -> Result<Product, RepositoryError> {
        let mut state = self.state.write().await;
        if state.products.iter().any(|p| p.menu_index == draft.menu_index) {
            return Err(RepositoryError::Conflict(format!(
                "product index {} already exists",
                draft.menu_index
            )));
        }
        let product = Product {
            id: ProductId(state.allocate_id()),
            menu_index: draft.menu_index,
            name: draft.name,
            description: draft.description,
        };
        state.products.push(product.clone());
        Ok(product)
    }

    async fn rename_product(&self, id: ProductId, name: &str) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        match state.products.iter_mut().find(|p| p.id == id) {
            Some(product) => {
                product.name = name.to_owned();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let before = state.products.len();
        state.products.retain(|p| p.id != id);
        if state.products.len() == before {
            return Ok(false);
        }
        state.offers.retain(|o| o.product_id != id);
        state.fields.retain(|f| f.product_id != id);
        Ok(true)
    }

    async fn list_offers(&self, product_id: ProductId) -> Result<Vec<Offer>, RepositoryError> {
        let state = self.state.read().await;
        let mut offers =
            state.offers.iter().filter(|o| o.product_id == product_id).cloned().collect::<Vec<_>>();
        offers.sort_by_key(|o| o.menu_index);
        Ok(offers)
    }

    async fn offer_by_index(
        &self,
        product_id: ProductId,
        menu_index: u32,
    ) -> Result<Option<Offer>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .offers
            .iter()
            .find(|o| o.product_id == product_id && o.menu_index == menu_index)
            .cloned())
    }

    async fn offer_by_id(&self, id: OfferId) -> Result<Option<Offer>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.offers.iter().find(|o| o.id == id).cloned())
    }

    async fn create_offer(
        &self,
        product_id: ProductId,
        draft: OfferDraft,
    ) -> Result<Offer, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.products.iter().any(|p| p.id == product_id) {
            return Err(RepositoryError::Conflict(format!("product {product_id} does not exist")));
        }
        if state.offers.iter().any(|o| o.product_id == product_id && o.menu_index == draft.menu_index)
        {
            return Err(RepositoryError::Conflict(format!(
                "offer index {} already exists for product {product_id}",
                draft.menu_index
            )));
        }
        let offer = Offer {
            id: OfferId(state.allocate_id()),
            product_id,
            menu_index: draft.menu_index,
            description: draft.description,
            price_mobile: draft.price_mobile,
            price_card: draft.price_card,
            price_usd: draft.price_usd,
        };
        state.offers.push(offer.clone());
        Ok(offer)
    }

    async fn update_offer(
        &self,
        id: OfferId,
        update: &OfferUpdate,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        match state.offers.iter_mut().find(|o| o.id == id) {
            Some(offer) => {
                offer.description = update.description.clone();
                offer.price_mobile = update.price_mobile;
                offer.price_card = update.price_card;
                offer.price_usd = update.price_usd;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_offer(&self, id: OfferId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let before = state.offers.len();
        state.offers.retain(|o| o.id != id);
        Ok(state.offers.len() != before)
    }

    async fn list_payment_methods(
        &self,
        method_type: Option<PaymentMethodType>,
    ) -> Result<Vec<PaymentMethod>, RepositoryError> {
        let state = self.state.read().await;
        let mut methods = state
            .methods
            .iter()
            .filter(|m| method_type.map_or(true, |t| m.method_type == t))
            .cloned()
            .collect::<Vec<_>>();
        methods.sort_by(|a, b| {
            a.method_type.as_str().cmp(b.method_type.as_str()).then(a.menu_index.cmp(&b.menu_index))
        });
        Ok(methods)
    }

    async fn payment_method_by_index(
        &self,
        method_type: PaymentMethodType,
        menu_index: u32,
    ) -> Result<Option<PaymentMethod>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .methods
            .iter()
            .find(|m| m.method_type == method_type && m.menu_index == menu_index)
            .cloned())
    }

    async fn payment_method_by_id(
        &self,
        id: PaymentMethodId,
    ) -> Result<Option<PaymentMethod>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.methods.iter().find(|m| m.id == id).cloned())
    }

    async fn create_payment_method(
        &self,
        draft: PaymentMethodDraft,
    ) -> Result<PaymentMethod, RepositoryError> {
        let mut state = self.state.write().await;
        if state
            .methods
            .iter()
            .any(|m| m.method_type == draft.method_type && m.menu_index == draft.menu_index)
        {
            return Err(RepositoryError::Conflict(format!(
                "{} method index {} already exists",
                draft.method_type.as_str(),
                draft.menu_index
            )));
        }
        let method = PaymentMethod {
            id: PaymentMethodId(state.allocate_id()),
            method_type: draft.method_type,
            menu_index: draft.menu_index,
            label: draft.label,
            details: draft.details,
        };
        state.methods.push(method.clone());
        Ok(method)
    }

    async fn update_payment_method(
        &self,
        id: PaymentMethodId,
        label: &str,
        details: &BTreeMap<String, String>,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        match state.methods.iter_mut().find(|m| m.id == id) {
            Some(method) => {
                method.label = label.to_owned();
                method.details.extend(details.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_payment_method(&self, id: PaymentMethodId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let before = state.methods.len();
        state.methods.retain(|m| m.id != id);
        Ok(state.methods.len() != before)
    }

    async fn list_fields(&self, product_id: ProductId) -> Result<Vec<CustomField>, RepositoryError> {
        let state = self.state.read().await;
        let mut fields =
            state.fields.iter().filter(|f| f.product_id == product_id).cloned().collect::<Vec<_>>();
        fields.sort_by_key(|f| (f.order, f.id));
        Ok(fields)
    }

    async fn create_field(
        &self,
        product_id: ProductId,
        name: &str,
        required: bool,
    ) -> Result<CustomField, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.products.iter().any(|p| p.id == product_id) {
            return Err(RepositoryError::Conflict(format!("product {product_id} does not exist")));
        }
        let existing = state.fields.iter().filter(|f| f.product_id == product_id);
        let mut next_order = 0;
        for field in existing {
            if field.name == name {
                return Err(RepositoryError::Conflict(format!(
                    "field `{name}` already exists for product {product_id}"
                )));
            }
            next_order = next_order.max(field.order + 1);
        }
        let field = CustomField {
            id: CustomFieldId(state.allocate_id()),
            product_id,
            name: name.to_owned(),
            order: next_order,
            required,
        };
        state.fields.push(field.clone());
        Ok(field)
    }

    async fn delete_field(
        &self,
        product_id: ProductId,
        name: &str,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let before = state.fields.len();
        state.fields.retain(|f| !(f.product_id == product_id && f.name == name));
        Ok(state.fields.len() != before)
    }
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionRepository {
    /// Number of identities with a stored session.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn get_or_create(&self, identity: &str) -> Result<Session, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.entry(identity.to_owned()).or_insert_with(|| Session::new(identity)).clone())
    }

    async fn save(&self, session: &Session) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.identity.clone(), session.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDialogRepository {
    dialogs: RwLock<HashMap<String, OperatorDialog>>,
}

#[async_trait::async_trait]
impl DialogRepository for InMemoryDialogRepository {
    async fn find(
        &self,
        operator_identity: &str,
    ) -> Result<Option<OperatorDialog>, RepositoryError> {
        let dialogs = self.dialogs.read().await;
        Ok(dialogs.get(operator_identity).cloned())
    }

    async fn save(&self, dialog: &OperatorDialog) -> Result<(), RepositoryError> {
        let mut dialogs = self.dialogs.write().await;
        dialogs.insert(dialog.operator_identity.clone(), dialog.clone());
        Ok(())
    }

    async fn clear(&self, operator_identity: &str) -> Result<bool, RepositoryError> {
        let mut dialogs = self.dialogs.write().await;
        Ok(dialogs.remove(operator_identity).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<String, Order>>,
}

impl InMemoryOrderRepository {
    pub async fn all(&self) -> Vec<Order> {
        let orders = self.orders.read().await;
        let mut all = orders.values().cloned().collect::<Vec<_>>();
        all.sort_by_key(|o| o.created_at);
        all
    }
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: &Order) -> Result<bool, RepositoryError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id.0) {
            return Ok(false);
        }
        orders.insert(order.id.0.clone(), order.clone());
        Ok(true)
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id.0).cloned())
    }

    async fn complete(
        &self,
        id: &OrderId,
        at: DateTime<Utc>,
    ) -> Result<CompletionOutcome, RepositoryError> {
        let mut orders = self.orders.write().await;
        let Some(order) = orders.get_mut(&id.0) else {
            return Ok(CompletionOutcome::NotFound);
        };
        if order.status != OrderStatus::Pending {
            return Ok(CompletionOutcome::AlreadyCompleted(order.clone()));
        }
        order
            .complete(at)
            .map_err(|e| RepositoryError::Conflict(e.to_string()))?;
        Ok(CompletionOutcome::Completed(order.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use recarga_core::domain::catalog::{OfferDraft, ProductDraft};
    use recarga_core::domain::order::{Order, OrderId, OrderStatus};

    use crate::repositories::{
        CatalogRepository, CompletionOutcome, InMemoryCatalogRepository, InMemoryOrderRepository,
        InMemorySessionRepository, OrderRepository, RepositoryError, SessionRepository,
    };

    #[tokio::test]
    async fn in_memory_catalog_mirrors_sql_uniqueness_and_cascade() {
        let repo = InMemoryCatalogRepository::default();
        let product = repo
            .create_product(ProductDraft {
                menu_index: 1,
                name: "Game A".to_string(),
                description: String::new(),
            })
            .await
            .expect("create");
        let duplicate = repo
            .create_product(ProductDraft {
                menu_index: 1,
                name: "Dup".to_string(),
                description: String::new(),
            })
            .await;
        assert!(matches!(duplicate, Err(RepositoryError::Conflict(_))));

        repo.create_offer(
            product.id,
            OfferDraft {
                menu_index: 1,
                description: "X".to_string(),
                price_mobile: 100,
                price_card: 150,
                price_usd: None,
            },
        )
        .await
        .expect("offer");
        repo.create_field(product.id, "player id", true).await.expect("field");

        assert!(repo.delete_product(product.id).await.expect("delete"));
        assert!(repo.list_offers(product.id).await.expect("offers").is_empty());
        assert!(repo.list_fields(product.id).await.expect("fields").is_empty());
    }

    #[tokio::test]
    async fn in_memory_sessions_are_lazily_created() {
        let repo = InMemorySessionRepository::default();
        assert!(repo.is_empty().await);
        let session = repo.get_or_create("5351111111").await.expect("create");
        assert!(session.state.is_idle());
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn in_memory_orders_complete_once() {
        let repo = InMemoryOrderRepository::default();
        let order = Order {
            id: OrderId("ORD-MEM".to_string()),
            user_identity: "5351111111".to_string(),
            product_name: "Game A".to_string(),
            offer_descriptions: vec!["X".to_string()],
            payment_method_label: "BPA".to_string(),
            payment_details: BTreeMap::new(),
            screenshot_ref: Some("ORD-MEM.jpg".to_string()),
            field_values: BTreeMap::new(),
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        };
        assert!(repo.create(&order).await.expect("create"));
        assert!(!repo.create(&order).await.expect("retry"));

        assert!(matches!(
            repo.complete(&order.id, Utc::now()).await.expect("complete"),
            CompletionOutcome::Completed(_)
        ));
        assert!(matches!(
            repo.complete(&order.id, Utc::now()).await.expect("complete again"),
            CompletionOutcome::AlreadyCompleted(_)
        ));
    }
}

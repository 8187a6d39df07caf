//! Product listing form.
//!
//! Holds raw input per field, checks it with the same rules a browser form
//! would apply, and on submit records the listing payload. Only a signed-in
//! user can submit. Publishing to the selected marketplaces is not implemented.

use std::collections::HashMap;

use merx_account::notice::Notice;
use merx_account::session::{SessionStore, SessionSubscription};
use merx_shared::form::{FieldError, FieldKind, FieldSpec, SelectOption};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::marketplace::Marketplace;

pub const CATEGORIES: &[SelectOption] = &[
    SelectOption { value: "electronics", label: "Electronics" },
    SelectOption { value: "clothing", label: "Clothing" },
    SelectOption { value: "home", label: "Home & Garden" },
    SelectOption { value: "books", label: "Books" },
    SelectOption { value: "toys", label: "Toys & Games" },
    SelectOption { value: "sports", label: "Sports" },
    SelectOption { value: "beauty", label: "Beauty" },
    SelectOption { value: "health", label: "Health" },
    SelectOption { value: "automotive", label: "Automotive" },
    SelectOption { value: "other", label: "Other" },
];

pub const CONDITIONS: &[SelectOption] = &[
    SelectOption { value: "new", label: "New" },
    SelectOption { value: "used", label: "Used" },
    SelectOption { value: "refurbished", label: "Refurbished" },
];

pub const PRODUCT_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("title", "Title", true),
    FieldSpec::text("sku", "SKU", false),
    FieldSpec::text_area("description", "Description", true),
    FieldSpec::number("price", "Price", true, Some(0.0), Some(0.01)),
    FieldSpec::number("quantity", "Quantity", true, Some(0.0), Some(1.0)),
    FieldSpec::text("brand", "Brand", false),
    FieldSpec::select("category", "Category", true, CATEGORIES),
    FieldSpec::select("condition", "Condition", true, CONDITIONS),
    FieldSpec::number("length", "Length (cm)", false, Some(0.0), Some(0.1)),
    FieldSpec::number("width", "Width (cm)", false, Some(0.0), Some(0.1)),
    FieldSpec::number("height", "Height (cm)", false, Some(0.0), Some(0.1)),
    FieldSpec::number("weight", "Weight (kg)", false, Some(0.0), Some(0.1)),
];

const DEFAULT_CONDITION: &str = "new";
const SUBMITTED_MESSAGE: &str = "Product saved successfully!";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormError {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("{} field(s) are invalid", .0.len())]
    Invalid(Vec<FieldError>),

    #[error("select at least one marketplace")]
    NoMarketplaces,

    #[error("sign in to list a product")]
    LoginRequired,
}

fn spec(name: &str) -> Option<&'static FieldSpec> {
    PRODUCT_FIELDS.iter().find(|f| f.name == name)
}

#[derive(Debug)]
pub struct ProductForm {
    session: SessionSubscription,
    values: HashMap<&'static str, String>,
    images: Vec<String>,
}

impl ProductForm {
    pub fn new(store: &SessionStore) -> Self {
        let mut values = HashMap::new();
        values.insert("condition", DEFAULT_CONDITION.to_string());
        Self {
            session: store.subscribe(),
            values,
            images: Vec::new(),
        }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        PRODUCT_FIELDS
    }

    /// Store raw input for a known field.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Result<(), FormError> {
        let spec = spec(name).ok_or_else(|| FieldError::UnknownField(name.to_string()))?;
        self.values.insert(spec.name, value.into());
        Ok(())
    }

    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or_default()
    }

    pub fn add_image(&mut self, name: impl Into<String>) {
        self.images.push(name.into());
    }

    pub fn remove_image(&mut self, index: usize) -> Option<String> {
        (index < self.images.len()).then(|| self.images.remove(index))
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    /// Check every field; reports all failures at once.
    pub fn validate(&self) -> Result<(), FormError> {
        let errors: Vec<FieldError> = PRODUCT_FIELDS
            .iter()
            .filter_map(|spec| spec.check(self.get(spec.name)).err())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(FormError::Invalid(errors))
        }
    }

    /// Listing payload: numbers as JSON numbers, empty optional fields omitted.
    pub fn payload(&self, marketplaces: &[Marketplace]) -> Value {
        let mut fields = Map::new();
        for spec in PRODUCT_FIELDS {
            let raw = self.get(spec.name);
            if raw.is_empty() {
                continue;
            }
            let value = match spec.kind {
                FieldKind::Number { .. } => raw
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(raw.to_string())),
                _ => Value::String(raw.to_string()),
            };
            fields.insert(spec.name.to_string(), value);
        }
        fields.insert("images".into(), Value::from(self.images.clone()));
        fields.insert(
            "marketplaces".into(),
            Value::from(marketplaces.iter().map(|m| m.id).collect::<Vec<_>>()),
        );
        Value::Object(fields)
    }

    /// Validate and record the listing.
    pub fn submit(&self, marketplaces: &[Marketplace]) -> Result<Notice, FormError> {
        if !self.session.current().is_authenticated() {
            return Err(FormError::LoginRequired);
        }
        if marketplaces.is_empty() {
            return Err(FormError::NoMarketplaces);
        }
        self.validate()?;
        let payload = self.payload(marketplaces);
        tracing::info!(payload = %payload, "product submitted");
        Ok(Notice::success(SUBMITTED_MESSAGE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::MARKETPLACES;
    use merx_shared::api::auth::{Identity, SessionEvent};
    use merx_shared::ids::UserId;

    fn signed_in_store() -> SessionStore {
        let store = SessionStore::new();
        store.apply(SessionEvent::signed_in(Identity {
            id: UserId::new(),
            email: "ana@example.com".into(),
        }));
        store
    }

    fn filled_for(store: &SessionStore) -> ProductForm {
        let mut form = ProductForm::new(store);
        form.set("title", "Wireless mouse").unwrap();
        form.set("description", "2.4 GHz, two buttons").unwrap();
        form.set("price", "79.90").unwrap();
        form.set("quantity", "12").unwrap();
        form.set("category", "electronics").unwrap();
        form
    }

    #[test]
    fn condition_defaults_to_new() {
        let form = ProductForm::new(&SessionStore::new());
        assert_eq!(form.get("condition"), "new");
    }

    #[test]
    fn unknown_field_is_rejected() {
        let mut form = ProductForm::new(&SessionStore::new());
        assert_eq!(
            form.set("colour", "red"),
            Err(FormError::Field(FieldError::UnknownField("colour".into())))
        );
    }

    #[test]
    fn empty_form_reports_every_required_field() {
        let form = ProductForm::new(&SessionStore::new());
        let Err(FormError::Invalid(errors)) = form.validate() else {
            panic!("expected invalid form");
        };
        let missing: Vec<_> = errors
            .iter()
            .filter_map(|e| match e {
                FieldError::Missing { field } => Some(*field),
                _ => None,
            })
            .collect();
        assert_eq!(
            missing,
            vec!["title", "description", "price", "quantity", "category"]
        );
    }

    #[test]
    fn price_must_align_to_cents() {
        let store = signed_in_store();
        let mut form = filled_for(&store);
        form.set("price", "10.005").unwrap();
        assert!(matches!(form.validate(), Err(FormError::Invalid(_))));
        form.set("price", "-1").unwrap();
        assert!(form.validate().is_err());
        form.set("price", "10.05").unwrap();
        assert!(form.validate().is_ok());
    }

    #[test]
    fn quantity_must_be_whole() {
        let store = signed_in_store();
        let mut form = filled_for(&store);
        form.set("quantity", "1.5").unwrap();
        assert!(form.validate().is_err());
    }

    #[test]
    fn submit_requires_marketplaces() {
        let form = filled_for(&signed_in_store());
        assert_eq!(form.submit(&[]), Err(FormError::NoMarketplaces));
    }

    #[test]
    fn submit_returns_success_notice() {
        let form = filled_for(&signed_in_store());
        let notice = form.submit(&MARKETPLACES[..2]).unwrap();
        assert_eq!(notice.message, SUBMITTED_MESSAGE);
    }

    #[test]
    fn submit_requires_login() {
        let store = signed_in_store();
        let form = filled_for(&store);
        assert!(form.submit(&MARKETPLACES[..1]).is_ok());

        store.apply(SessionEvent::signed_out());
        assert_eq!(form.submit(&MARKETPLACES[..1]), Err(FormError::LoginRequired));
    }

    #[test]
    fn payload_types_numbers_and_skips_empty() {
        let store = signed_in_store();
        let mut form = filled_for(&store);
        form.add_image("front.jpg");
        form.add_image("back.jpg");
        assert_eq!(form.remove_image(0).as_deref(), Some("front.jpg"));
        assert_eq!(form.remove_image(5), None);

        let payload = form.payload(&MARKETPLACES[..1]);
        assert_eq!(payload["price"], serde_json::json!(79.9));
        assert_eq!(payload["quantity"], serde_json::json!(12.0));
        assert_eq!(payload["condition"], "new");
        assert!(payload.get("sku").is_none());
        assert_eq!(payload["images"], serde_json::json!(["back.jpg"]));
        assert_eq!(payload["marketplaces"], serde_json::json!(["mercadolivre"]));
    }
}

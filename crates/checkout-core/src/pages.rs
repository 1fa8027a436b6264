//! Page and Submission Operations
//!
//! Owner-scoped page lifecycle plus the public form submit.

use std::collections::HashMap;

use chrono::Utc;
use serde::Deserialize;

use crate::error::{CoreError, Result};
use crate::model::{
    FormField, Layout, OrderBump, Page, PageId, Product, Submission, User, UserId,
};
use crate::plan::{Resource, check_quota};
use crate::slug::{is_valid_slug, resolve_slug};
use crate::store::Store;

/// Fields supplied when creating a page
#[derive(Clone, Debug, Deserialize)]
pub struct PageDraft {
    /// Derived from the title when omitted
    #[serde(default)]
    pub slug: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub product: Product,
    #[serde(default)]
    pub fields: Vec<FormField>,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default)]
    pub order_bumps: Vec<OrderBump>,
    #[serde(default)]
    pub success_url: Option<String>,
    #[serde(default)]
    pub cancel_url: Option<String>,
}

/// Partial page update; absent fields are left untouched
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PageUpdate {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub product: Option<Product>,
    pub fields: Option<Vec<FormField>>,
    pub layout: Option<Layout>,
    pub order_bumps: Option<Vec<OrderBump>>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

/// Audit details captured with a public submit
#[derive(Clone, Debug, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

async fn load_user(store: &dyn Store, id: &UserId) -> Result<User> {
    store
        .get_user(id)
        .await?
        .ok_or_else(|| CoreError::not_found("user", id.as_str()))
}

/// Create a page for `owner`, subject to their plan quota.
pub async fn create_page(store: &dyn Store, owner: &UserId, draft: PageDraft) -> Result<Page> {
    check_quota(store, owner, Resource::Page).await?;

    let slug = resolve_slug(store, draft.slug.as_deref(), &draft.title).await?;
    let now = Utc::now();
    let mut product = draft.product;
    product.currency = product.currency.to_lowercase();

    let page = Page {
        id: PageId::new(),
        owner_id: owner.clone(),
        slug,
        title: draft.title,
        description: draft.description,
        product,
        fields: draft.fields,
        layout: draft.layout,
        order_bumps: draft.order_bumps,
        success_url: draft.success_url,
        cancel_url: draft.cancel_url,
        created_at: now,
        updated_at: now,
    };
    page.validate()?;
    store.insert_page(&page).await?;

    let mut user = load_user(store, owner).await?;
    user.page_ids.push(page.id.clone());
    user.updated_at = now;
    store.update_user(&user).await?;

    tracing::info!(page_id = %page.id, slug = %page.slug, owner = %owner, "Created page");
    Ok(page)
}

/// Fetch a page, enforcing ownership.
pub async fn owned_page(store: &dyn Store, owner: &UserId, id: &PageId) -> Result<Page> {
    let page = store
        .get_page(id)
        .await?
        .ok_or_else(|| CoreError::not_found("page", id.as_str()))?;

    if !page.is_owned_by(owner) {
        return Err(CoreError::Forbidden(format!("Page {id} belongs to another user")));
    }
    Ok(page)
}

pub async fn update_page(
    store: &dyn Store,
    owner: &UserId,
    id: &PageId,
    update: PageUpdate,
) -> Result<Page> {
    let mut page = owned_page(store, owner, id).await?;

    if let Some(slug) = update.slug.filter(|s| *s != page.slug) {
        if !is_valid_slug(&slug) {
            return Err(CoreError::Validation(format!("Invalid slug: {slug}")));
        }
        if store.slug_exists(&slug).await? {
            return Err(CoreError::Conflict(format!("Slug already in use: {slug}")));
        }
        page.slug = slug;
    }
    if let Some(title) = update.title {
        page.title = title;
    }
    if let Some(description) = update.description {
        page.description = Some(description);
    }
    if let Some(mut product) = update.product {
        product.currency = product.currency.to_lowercase();
        page.product = product;
    }
    if let Some(fields) = update.fields {
        page.fields = fields;
    }
    if let Some(layout) = update.layout {
        page.layout = layout;
    }
    if let Some(order_bumps) = update.order_bumps {
        page.order_bumps = order_bumps;
    }
    if let Some(url) = update.success_url {
        page.success_url = Some(url);
    }
    if let Some(url) = update.cancel_url {
        page.cancel_url = Some(url);
    }

    page.validate()?;
    page.updated_at = Utc::now();
    store.update_page(&page).await?;
    Ok(page)
}

/// Delete a page and drop it from the owner's page list.
pub async fn delete_page(store: &dyn Store, owner: &UserId, id: &PageId) -> Result<()> {
    let page = owned_page(store, owner, id).await?;
    store.delete_page(&page.id).await?;

    let mut user = load_user(store, owner).await?;
    user.page_ids.retain(|p| p != &page.id);
    user.updated_at = Utc::now();
    store.update_user(&user).await?;

    tracing::info!(page_id = %page.id, owner = %owner, "Deleted page");
    Ok(())
}

/// Public form submit on the page published under `slug`.
pub async fn submit_form(
    store: &dyn Store,
    slug: &str,
    data: HashMap<String, String>,
    meta: RequestMeta,
) -> Result<Submission> {
    let page = store
        .get_page_by_slug(slug)
        .await?
        .ok_or_else(|| CoreError::not_found("page", slug))?;

    let missing: Vec<&str> = page
        .fields
        .iter()
        .filter(|f| f.required)
        .filter(|f| data.get(&f.label).is_none_or(|v| v.trim().is_empty()))
        .map(|f| f.label.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(CoreError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    let mut submission = Submission::new(page.id.clone(), data);
    submission.ip_address = meta.ip_address;
    submission.user_agent = meta.user_agent;
    store.insert_submission(&submission).await?;

    tracing::info!(submission_id = %submission.id, page_id = %page.id, "Recorded submission");
    Ok(submission)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldType;
    use crate::plan::Plan;
    use crate::store::{MemoryStore, PageStore, UserStore};

    fn draft(title: &str, slug: Option<&str>) -> PageDraft {
        PageDraft {
            slug: slug.map(String::from),
            title: title.into(),
            description: None,
            product: Product {
                name: "Ebook".into(),
                description: None,
                price_cents: 1000,
                currency: "USD".into(),
            },
            fields: vec![FormField {
                label: "Email".into(),
                field_type: FieldType::Email,
                required: true,
            }],
            layout: Layout::Classic,
            order_bumps: Vec::new(),
            success_url: None,
            cancel_url: None,
        }
    }

    async fn merchant(store: &MemoryStore, plan: Plan) -> UserId {
        let mut user = User::new("m@example.com", "M", "h");
        user.plan = plan;
        store.insert_user(&user).await.unwrap();
        user.id
    }

    #[tokio::test]
    async fn test_create_page_tracks_ownership() {
        let store = MemoryStore::new();
        let owner = merchant(&store, Plan::Builder).await;

        let page = create_page(&store, &owner, draft("Launch", None)).await.unwrap();
        assert_eq!(page.slug, "launch");
        assert_eq!(page.product.currency, "usd");

        let user = store.get_user(&owner).await.unwrap().unwrap();
        assert_eq!(user.page_ids, vec![page.id]);
    }

    #[tokio::test]
    async fn test_explicit_slug_collision_rejected() {
        let store = MemoryStore::new();
        let owner = merchant(&store, Plan::Pro).await;

        create_page(&store, &owner, draft("One", Some("offer"))).await.unwrap();
        let err = create_page(&store, &owner, draft("Two", Some("offer")))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_derived_slug_gets_suffix_on_collision() {
        let store = MemoryStore::new();
        let owner = merchant(&store, Plan::Pro).await;

        let first = create_page(&store, &owner, draft("Big Sale", None)).await.unwrap();
        let second = create_page(&store, &owner, draft("Big Sale", None)).await.unwrap();

        assert_eq!(first.slug, "big-sale");
        assert!(second.slug.starts_with("big-sale-"));
        assert_eq!(second.slug.len(), "big-sale-".len() + 6);
    }

    #[tokio::test]
    async fn test_free_plan_quota() {
        let store = MemoryStore::new();
        let owner = merchant(&store, Plan::Free).await;

        create_page(&store, &owner, draft("First", None)).await.unwrap();
        let err = create_page(&store, &owner, draft("Second", None))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::QuotaExceeded { current: 1, .. }));
    }

    #[tokio::test]
    async fn test_concurrent_creates_may_overshoot_quota() {
        // Check-then-act: both gates read a count of zero before either insert.
        let store = MemoryStore::new();
        let owner = merchant(&store, Plan::Free).await;

        check_quota(&store, &owner, Resource::Page).await.unwrap();
        check_quota(&store, &owner, Resource::Page).await.unwrap();

        let user = store.get_user(&owner).await.unwrap().unwrap();
        for title in ["A", "B"] {
            let now = Utc::now();
            let page = Page {
                id: PageId::new(),
                owner_id: user.id.clone(),
                slug: title.to_lowercase(),
                title: title.into(),
                description: None,
                product: draft(title, None).product,
                fields: Vec::new(),
                layout: Layout::Classic,
                order_bumps: Vec::new(),
                success_url: None,
                cancel_url: None,
                created_at: now,
                updated_at: now,
            };
            store.insert_page(&page).await.unwrap();
        }
        assert_eq!(store.count_pages_by_owner(&owner).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_only_owner_can_update_or_delete() {
        let store = MemoryStore::new();
        let owner = merchant(&store, Plan::Pro).await;
        let intruder = User::new("x@example.com", "X", "h");
        store.insert_user(&intruder).await.unwrap();

        let page = create_page(&store, &owner, draft("Mine", None)).await.unwrap();

        let update = PageUpdate {
            title: Some("Stolen".into()),
            ..Default::default()
        };
        assert!(matches!(
            update_page(&store, &intruder.id, &page.id, update).await,
            Err(CoreError::Forbidden(_))
        ));
        assert!(matches!(
            delete_page(&store, &intruder.id, &page.id).await,
            Err(CoreError::Forbidden(_))
        ));

        delete_page(&store, &owner, &page.id).await.unwrap();
        let user = store.get_user(&owner).await.unwrap().unwrap();
        assert!(user.page_ids.is_empty());
        assert!(store.get_page(&page.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_submit_requires_required_fields() {
        let store = MemoryStore::new();
        let owner = merchant(&store, Plan::Pro).await;
        let page = create_page(&store, &owner, draft("Form", None)).await.unwrap();

        let err = submit_form(&store, &page.slug, HashMap::new(), RequestMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let mut data = HashMap::new();
        data.insert("Email".to_string(), "buyer@example.com".to_string());
        let meta = RequestMeta {
            ip_address: Some("203.0.113.9".into()),
            user_agent: Some("test-agent".into()),
        };
        let submission = submit_form(&store, &page.slug, data, meta).await.unwrap();
        assert_eq!(submission.page_id, page.id);
        assert_eq!(submission.ip_address.as_deref(), Some("203.0.113.9"));
        assert!(!submission.is_linked());
    }
}

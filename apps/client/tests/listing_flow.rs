use std::sync::Arc;

use merx_account::avatar::AvatarFile;
use merx_account::editor::EditorState;
use merx_account::header::HeaderView;
use merx_account::memory::MemoryBackend;
use merx_account::notice::NoticeLevel;
use merx_account::storage::{AvatarStoreConfig, ObjectStoreAvatars};
use merx_client::app::App;
use merx_client::config::ClientConfig;
use merx_client::marketplace::SelectionError;
use merx_client::product::FormError;

fn offline_config() -> ClientConfig {
    ClientConfig {
        cache_bust_avatars: true,
        storage: AvatarStoreConfig {
            backend: "memory".into(),
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn signed_in_app() -> (App, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_account("ana@example.com", "secret");
    let avatars = Arc::new(ObjectStoreAvatars::in_memory("https://cdn.example.com/avatars"));
    let app = App::with_backends(offline_config(), backend.clone(), avatars).await;
    app.sign_in("ana@example.com", "secret").await.unwrap();
    (app, backend)
}

#[tokio::test]
async fn select_marketplaces_and_submit_product() {
    let (app, _) = signed_in_app().await;

    let mut selector = app.marketplace_selector();
    assert_eq!(selector.proceed(), Err(SelectionError::NothingSelected));
    selector.toggle("mercadolivre").unwrap();
    selector.toggle("shopee").unwrap();
    let marketplaces = selector.proceed().unwrap();
    assert_eq!(marketplaces.len(), 2);

    let mut form = app.product_form();
    assert!(matches!(form.submit(&marketplaces), Err(FormError::Invalid(_))));

    form.set("title", "Ceramic mug").unwrap();
    form.set("description", "350 ml, dishwasher safe").unwrap();
    form.set("price", "39.90").unwrap();
    form.set("quantity", "40").unwrap();
    form.set("category", "home").unwrap();
    form.set("weight", "0.4").unwrap();
    form.add_image("mug.jpg");

    let notice = form.submit(&marketplaces).unwrap();
    assert_eq!(notice.level, NoticeLevel::Success);
}

#[tokio::test]
async fn profile_edit_shows_in_new_header() {
    let (app, backend) = signed_in_app().await;

    let mut editor = app.profile_editor();
    editor.load().await.unwrap();
    editor.set_full_name("Ana Souza");
    editor.set_username("ana");
    editor.stage_avatar(AvatarFile::new("me.png", vec![1, 2, 3]));
    editor.submit().await.unwrap();
    assert_eq!(editor.state(), EditorState::NavigatedAway);

    let id = app.session().current().user_id().unwrap();
    let avatar = backend.profile(id).unwrap().avatar_url.unwrap();
    assert!(avatar.starts_with("https://cdn.example.com/avatars/"));
    assert!(avatar.contains(".png?v="));

    let mut header = app.header();
    header.sync().await;
    assert_eq!(
        header.view(),
        HeaderView::LoggedIn {
            display_name: "Ana Souza".into()
        }
    );
}

#[tokio::test]
async fn signed_out_user_cannot_select() {
    let (app, _) = signed_in_app().await;
    let mut selector = app.marketplace_selector();
    let mut sub = app.session().subscribe();

    app.sign_out().await.unwrap();
    sub.changed().await.unwrap();
    assert_eq!(selector.toggle("olx"), Err(SelectionError::LoginRequired));
}

#[tokio::test]
async fn signed_out_user_cannot_submit_product() {
    let (app, _) = signed_in_app().await;
    let mut selector = app.marketplace_selector();
    selector.toggle("amazon").unwrap();
    let marketplaces = selector.proceed().unwrap();

    let mut form = app.product_form();
    form.set("title", "Ceramic mug").unwrap();
    form.set("description", "350 ml, dishwasher safe").unwrap();
    form.set("price", "39.90").unwrap();
    form.set("quantity", "40").unwrap();
    form.set("category", "home").unwrap();

    let mut sub = app.session().subscribe();
    app.sign_out().await.unwrap();
    sub.changed().await.unwrap();
    assert_eq!(form.submit(&marketplaces), Err(FormError::LoginRequired));
}

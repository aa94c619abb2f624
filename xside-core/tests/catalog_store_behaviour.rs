//! Behavioural tests for `SqliteCatalogStore` using rstest-bdd.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use xside_core::{
    CatalogItem, CatalogStore, CatalogStoreError, ItemId, SqliteCatalogStore,
    test_support::{item, square},
};

/// Shared state for catalog store scenarios.
struct StoreWorld {
    store: RefCell<Option<SqliteCatalogStore>>,
    install_error: RefCell<Option<CatalogStoreError>>,
}

impl StoreWorld {
    fn new() -> Self {
        Self {
            store: RefCell::new(None),
            install_error: RefCell::new(None),
        }
    }

    fn install(&self, items: &[CatalogItem]) {
        let borrowed = self.store.borrow();
        let store = borrowed.as_ref().expect("store opened");
        let result = store.replace_snapshot(items);
        self.install_error.replace(result.err());
    }

    fn projected_ids(&self) -> Vec<ItemId> {
        let borrowed = self.store.borrow();
        let store = borrowed.as_ref().expect("store opened");
        store
            .load_projection()
            .expect("projection loads")
            .items()
            .iter()
            .map(|found| found.id)
            .collect()
    }
}

#[fixture]
fn world() -> StoreWorld {
    StoreWorld::new()
}

fn three_items() -> Vec<CatalogItem> {
    vec![
        item(3, square(0.0, 0.0, 1.0), 1.0, &["c.png"]),
        item(1, square(1.0, 1.0, 1.0), 2.0, &["a.png"]),
        item(2, square(2.0, 2.0, 1.0), 3.0, &["b.png"]),
    ]
}

#[given("an empty SQLite catalog store")]
fn given_empty_store(world: &StoreWorld) {
    let store = SqliteCatalogStore::open_in_memory().expect("open store");
    world.store.replace(Some(store));
}

#[given("a snapshot of three items is installed")]
fn given_installed(world: &StoreWorld) {
    world.install(&three_items());
    assert!(world.install_error.borrow().is_none(), "setup install failed");
}

#[when("I install a snapshot of three items")]
fn when_install_three(world: &StoreWorld) {
    world.install(&three_items());
}

#[when("I install a snapshot containing only item 9")]
fn when_install_single(world: &StoreWorld) {
    world.install(&[item(9, square(5.0, 5.0, 1.0), 1.0, &["z.png"])]);
}

#[when("I install a snapshot that repeats an id")]
fn when_install_duplicate(world: &StoreWorld) {
    let repeated = item(7, square(5.0, 5.0, 1.0), 1.0, &["r.png"]);
    world.install(&[repeated.clone(), repeated]);
}

#[then("the projection lists items 1, 2 and 3 in id order")]
fn then_three_ids(world: &StoreWorld) {
    assert_eq!(world.projected_ids(), vec![1, 2, 3]);
}

#[then("the projection lists only item 9")]
fn then_only_nine(world: &StoreWorld) {
    assert_eq!(world.projected_ids(), vec![9]);
}

#[then("the install fails with a duplicate id error")]
fn then_duplicate_error(world: &StoreWorld) {
    let borrowed = world.install_error.borrow();
    assert!(
        matches!(
            borrowed.as_ref(),
            Some(CatalogStoreError::DuplicateId { id: 7 })
        ),
        "expected DuplicateId, got {borrowed:?}"
    );
}

#[scenario(path = "tests/features/catalog_store.feature", index = 0)]
fn installs_snapshot(world: StoreWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/catalog_store.feature", index = 1)]
fn replaces_snapshot(world: StoreWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/catalog_store.feature", index = 2)]
fn rejects_duplicate_ids(world: StoreWorld) {
    let _ = world;
}

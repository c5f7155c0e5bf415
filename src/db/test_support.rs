use tempfile::TempDir;

use super::{init_database, Repository};
use crate::models::{
    Branch, CreateBranchRequest, CreatePartyRequest, CreateProductRequest, Party, PartyKind,
    Product,
};

/// Fresh repository on a throwaway database; keep the `TempDir` alive for the test.
pub(crate) async fn test_repo() -> (Repository, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("test.sqlite"))
        .await
        .unwrap();
    (Repository::new(pool), temp_dir)
}

/// Close the pool so every later query fails.
pub(crate) async fn close(repo: &Repository) {
    repo.pool.close().await;
}

pub(crate) async fn seed_branch(repo: &Repository, code: &str) -> Branch {
    repo.create_branch(&CreateBranchRequest {
        id: None,
        name: format!("Branch {}", code),
        code: code.to_string(),
        address: None,
        active: true,
    })
    .await
    .unwrap()
}

pub(crate) async fn seed_product(repo: &Repository, sku: &str, cost: i64, price: i64) -> Product {
    repo.create_product(&CreateProductRequest {
        id: None,
        sku: sku.to_string(),
        name: format!("Product {}", sku),
        barcode: None,
        category_id: None,
        unit: "pcs".to_string(),
        cost_price: cost,
        sale_price: price,
        reorder_level: 0,
        description: None,
        active: true,
    })
    .await
    .unwrap()
}

pub(crate) async fn seed_party(repo: &Repository, kind: PartyKind, name: &str) -> Party {
    repo.create_party(
        kind,
        &CreatePartyRequest {
            id: None,
            name: name.to_string(),
            phone: None,
            email: None,
            address: None,
            notes: None,
            active: true,
        },
    )
    .await
    .unwrap()
}

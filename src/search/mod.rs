//! Tantivy-based product search.
//!
//! Products are matched on name, SKU, barcode, category name and description, with
//! per-field boosts so a name hit outranks a description hit.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, QueryParser};
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tokio::sync::RwLock;

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{Category, Product, ProductFilter};

const BOOST_NAME: f32 = 10.0;
const BOOST_SKU: f32 = 8.0;
const BOOST_BARCODE: f32 = 8.0;
const BOOST_CATEGORY: f32 = 4.0;
const BOOST_DESCRIPTION: f32 = 2.0;

/// Indexing buffer shared by all writer threads.
const WRITER_HEAP_BYTES: usize = 50_000_000;

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub product_id: String,
    pub score: f32,
}

struct ProductFields {
    product_id: Field,
    name: Field,
    sku: Field,
    barcode: Field,
    category: Field,
    description: Field,
}

pub struct ProductIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: ProductFields,
}

impl ProductIndex {
    /// Create or open the index at `index_path`.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        let mut schema_builder = Schema::builder();
        // Raw-token id so updates and deletes can address a document by term
        let product_id = schema_builder.add_text_field("product_id", STRING | STORED);
        let name = schema_builder.add_text_field("name", TEXT);
        let sku = schema_builder.add_text_field("sku", TEXT);
        let barcode = schema_builder.add_text_field("barcode", TEXT);
        let category = schema_builder.add_text_field("category", TEXT);
        let description = schema_builder.add_text_field("description", TEXT);
        let schema = schema_builder.build();

        let fields = ProductFields {
            product_id,
            name,
            sku,
            barcode,
            category,
            description,
        };

        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema))
            .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Replace the whole index with `products`.
    pub async fn rebuild(&self, products: &[Product], categories: &[Category]) -> Result<(), AppError> {
        let names = category_names(categories);
        let mut writer = self.writer.write().await;

        writer.delete_all_documents()?;
        for product in products {
            writer.add_document(self.create_document(product, &names))?;
        }
        writer.commit()?;
        self.reader.reload()?;

        tracing::info!("Product index rebuilt with {} products", products.len());
        Ok(())
    }

    /// Insert or replace one product.
    pub async fn index_product(&self, product: &Product, categories: &[Category]) -> Result<(), AppError> {
        let names = category_names(categories);
        let mut writer = self.writer.write().await;

        writer.delete_term(Term::from_field_text(self.fields.product_id, &product.id));
        writer.add_document(self.create_document(product, &names))?;
        writer.commit()?;
        self.reader.reload()?;

        Ok(())
    }

    /// Reindex `products` against the current category names. Nothing is written when the
    /// categories cannot be loaded, so existing entries keep their category text.
    pub async fn refresh_products(&self, repo: &Repository, products: &[Product]) -> Result<(), AppError> {
        let categories = repo.list_categories().await?;
        for product in products {
            self.index_product(product, &categories).await?;
        }
        Ok(())
    }

    /// Reindex every product filed under `category_id`.
    pub async fn refresh_category(&self, repo: &Repository, category_id: &str) -> Result<(), AppError> {
        let filter = ProductFilter {
            category_id: Some(category_id.to_string()),
            active: None,
        };
        let products = repo.list_products(&filter).await?;
        self.refresh_products(repo, &products).await
    }

    pub async fn remove_product(&self, product_id: &str) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_term(Term::from_field_text(self.fields.product_id, product_id));
        writer.commit()?;
        self.reader.reload()?;

        Ok(())
    }

    /// Ranked product ids for `query_str`. An empty query matches nothing.
    pub fn search(&self, query_str: &str, limit: usize, offset: usize) -> Result<Vec<SearchHit>, AppError> {
        if query_str.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        let field_boosts = [
            (self.fields.name, BOOST_NAME),
            (self.fields.sku, BOOST_SKU),
            (self.fields.barcode, BOOST_BARCODE),
            (self.fields.category, BOOST_CATEGORY),
            (self.fields.description, BOOST_DESCRIPTION),
        ];

        let mut subqueries: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for (field, boost) in field_boosts {
            let parser = QueryParser::for_index(&self.index, vec![field]);
            if let Ok(field_query) = parser.parse_query(query_str) {
                subqueries.push((Occur::Should, Box::new(BoostQuery::new(field_query, boost))));
            }
        }

        let query: Box<dyn Query> = if subqueries.is_empty() {
            // Fall back to the combined parser so the error explains what was wrong
            let parser = QueryParser::for_index(
                &self.index,
                field_boosts.iter().map(|(field, _)| *field).collect(),
            );
            parser
                .parse_query(query_str)
                .map_err(|e| AppError::Search(format!("Invalid search query: {}", e)))?
        } else {
            Box::new(BooleanQuery::new(subqueries))
        };

        // No page can reach past the last document; this also bounds the collector size
        let num_docs = usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX);
        let window = match limit.checked_add(offset) {
            Some(window) if offset < num_docs => window.min(num_docs),
            _ => return Ok(Vec::new()),
        };

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(window))
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        Ok(top_docs
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(score, address)| {
                let doc: TantivyDocument = searcher.doc(address).ok()?;
                let product_id = doc.get_first(self.fields.product_id)?.as_str()?.to_string();
                Some(SearchHit { product_id, score })
            })
            .collect())
    }

    fn create_document(&self, product: &Product, category_names: &HashMap<&str, &str>) -> TantivyDocument {
        let category = product
            .category_id
            .as_deref()
            .and_then(|id| category_names.get(id).copied())
            .unwrap_or_default();

        doc!(
            self.fields.product_id => product.id.clone(),
            self.fields.name => product.name.clone(),
            self.fields.sku => product.sku.clone(),
            self.fields.barcode => product.barcode.clone().unwrap_or_default(),
            self.fields.category => category.to_string(),
            self.fields.description => product.description.clone().unwrap_or_default()
        )
    }
}

fn category_names(categories: &[Category]) -> HashMap<&str, &str> {
    categories
        .iter()
        .map(|c| (c.id.as_str(), c.name.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn product(id: &str, sku: &str, name: &str, category_id: Option<&str>, description: &str) -> Product {
        Product {
            id: id.to_string(),
            sku: sku.to_string(),
            name: name.to_string(),
            barcode: None,
            category_id: category_id.map(str::to_string),
            unit: "pcs".to_string(),
            cost_price: 0,
            sale_price: 0,
            reorder_level: 0,
            description: Some(description.to_string()),
            active: true,
            updated_at: "2024-01-01T00:00:00Z".to_string(),
            version: 1,
        }
    }

    fn dairy() -> Vec<Category> {
        vec![Category {
            id: "c1".to_string(),
            name: "Dairy".to_string(),
            parent_id: None,
            description: None,
            updated_at: "2024-01-01T00:00:00Z".to_string(),
            version: 1,
        }]
    }

    #[tokio::test]
    async fn test_name_outranks_description() {
        let temp_dir = TempDir::new().unwrap();
        let index = ProductIndex::open(temp_dir.path()).unwrap();

        let products = vec![
            product("1", "CHS-1", "Cheddar Cheese", Some("c1"), "Aged block"),
            product("2", "CRK-1", "Crackers", None, "Goes well with cheese"),
        ];
        index.rebuild(&products, &dairy()).await.unwrap();

        let hits = index.search("cheese", 10, 0).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].product_id, "1");

        let by_category = index.search("dairy", 10, 0).unwrap();
        assert_eq!(by_category.len(), 1);
        assert_eq!(by_category[0].product_id, "1");
    }

    #[tokio::test]
    async fn test_reindex_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let index = ProductIndex::open(temp_dir.path()).unwrap();

        let mut milk = product("1", "MLK-1", "Whole Milk", Some("c1"), "");
        index.index_product(&milk, &dairy()).await.unwrap();
        assert_eq!(index.search("milk", 10, 0).unwrap().len(), 1);

        milk.name = "Oat Drink".to_string();
        index.index_product(&milk, &dairy()).await.unwrap();
        assert!(index.search("milk", 10, 0).unwrap().is_empty());
        assert_eq!(index.search("oat", 10, 0).unwrap().len(), 1);

        index.remove_product("1").await.unwrap();
        assert!(index.search("oat", 10, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_empty_query() {
        let temp_dir = TempDir::new().unwrap();
        let index = ProductIndex::open(temp_dir.path()).unwrap();

        assert!(index.search("", 10, 0).unwrap().is_empty());
        assert!(index.search("   ", 10, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_keeps_entry_when_categories_unavailable() {
        let (repo, _dir) = crate::db::test_support::test_repo().await;
        let temp_dir = TempDir::new().unwrap();
        let index = ProductIndex::open(temp_dir.path()).unwrap();

        let mut cheese = product("1", "CHS-1", "Cheddar", Some("c1"), "");
        index.index_product(&cheese, &dairy()).await.unwrap();

        crate::db::test_support::close(&repo).await;
        cheese.name = "Gouda".to_string();
        assert!(index.refresh_products(&repo, &[cheese]).await.is_err());

        let by_category = index.search("dairy", 10, 0).unwrap();
        assert_eq!(by_category.len(), 1);
        assert!(index.search("gouda", 10, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offset_past_the_end() {
        let temp_dir = TempDir::new().unwrap();
        let index = ProductIndex::open(temp_dir.path()).unwrap();
        let products = vec![
            product("1", "SOAP-1", "Olive Soap", None, ""),
            product("2", "SOAP-2", "Lavender Soap", None, ""),
        ];
        index.rebuild(&products, &dairy()).await.unwrap();

        assert_eq!(index.search("soap", 100, 1).unwrap().len(), 1);
        assert!(index.search("soap", 100, 2).unwrap().is_empty());
        assert!(index.search("soap", 100, usize::MAX).unwrap().is_empty());
        assert!(index.search("soap", usize::MAX, 1_000_000).unwrap().is_empty());
    }
}

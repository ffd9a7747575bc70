//! Product grid browsing: search, category and stock filters, sorting and
//! pagination over an already-fetched product list.

use std::cmp::Ordering;

use crate::backend::PosBackend;
use crate::error::PosResult;
use crate::models::{CategoryId, MainCategory, Product, SubCategory};

pub const PRODUCTS_PER_PAGE: usize = 9;

/// Main and sub categories as loaded from the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryTree {
    main: Vec<MainCategory>,
    sub: Vec<SubCategory>,
}

impl CategoryTree {
    pub fn new(main: Vec<MainCategory>, sub: Vec<SubCategory>) -> Self {
        Self { main, sub }
    }

    pub async fn load(backend: &dyn PosBackend) -> PosResult<Self> {
        let (main, sub) = tokio::try_join!(
            backend.list_main_categories(),
            backend.list_sub_categories()
        )?;
        Ok(Self::new(main, sub))
    }

    pub fn main_categories(&self) -> &[MainCategory] {
        &self.main
    }

    pub fn sub_categories(&self) -> &[SubCategory] {
        &self.sub
    }

    pub fn sub_categories_of(&self, main: CategoryId) -> impl Iterator<Item = &SubCategory> + '_ {
        self.sub.iter().filter(move |s| s.main_category == main)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StockFilter {
    #[default]
    All,
    InStock,
    OutOfStock,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    NameAsc,
    NameDesc,
    PriceAsc,
    PriceDesc,
    StockAsc,
    StockDesc,
}

/// Current state of the grid controls. Every filter change returns to page 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductQuery {
    search: String,
    main_category: Option<CategoryId>,
    sub_category: Option<CategoryId>,
    stock: StockFilter,
    sort: SortOrder,
    page: usize,
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            main_category: None,
            sub_category: None,
            stock: StockFilter::All,
            sort: SortOrder::NameAsc,
            page: 1,
        }
    }
}

impl ProductQuery {
    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn stock(&self) -> StockFilter {
        self.stock
    }

    pub fn set_search(&mut self, term: &str) {
        self.search = term.to_string();
        self.page = 1;
    }

    /// Main and sub category selections are mutually exclusive.
    pub fn select_main_category(&mut self, id: Option<CategoryId>) {
        self.main_category = id;
        self.sub_category = None;
        self.page = 1;
    }

    pub fn select_sub_category(&mut self, id: Option<CategoryId>) {
        self.sub_category = id;
        self.main_category = None;
        self.page = 1;
    }

    /// Selecting the active stock filter again switches it off.
    pub fn toggle_stock(&mut self, filter: StockFilter) {
        self.stock = if self.stock == filter {
            StockFilter::All
        } else {
            filter
        };
        self.page = 1;
    }

    /// Sorting keeps the current page.
    pub fn set_sort(&mut self, sort: SortOrder) {
        self.sort = sort;
    }

    pub fn next_page(&mut self, total_pages: usize) {
        if self.page < total_pages {
            self.page += 1;
        }
    }

    pub fn previous_page(&mut self) {
        if self.page > 1 {
            self.page -= 1;
        }
    }
}

fn name_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn matches(product: &Product, subs: &[SubCategory], q: &ProductQuery, needle: &str) -> bool {
    if !product.name.to_lowercase().contains(needle) {
        return false;
    }
    if let Some(main) = q.main_category {
        let in_main = subs
            .iter()
            .any(|s| Some(s.id) == product.sub_category && s.main_category == main);
        if !in_main {
            return false;
        }
    }
    if let Some(sub) = q.sub_category {
        if product.sub_category != Some(sub) {
            return false;
        }
    }
    match q.stock {
        StockFilter::All => true,
        StockFilter::InStock => product.quantity > 0,
        StockFilter::OutOfStock => product.quantity == 0,
    }
}

/// Apply the query's filters and sort order.
pub fn filter_products<'a>(
    products: &'a [Product],
    subs: &[SubCategory],
    q: &ProductQuery,
) -> Vec<&'a Product> {
    let needle = q.search.to_lowercase();
    let mut out: Vec<&Product> = products
        .iter()
        .filter(|p| matches(p, subs, q, &needle))
        .collect();

    match q.sort {
        SortOrder::NameAsc => out.sort_by(|a, b| name_cmp(&a.name, &b.name)),
        SortOrder::NameDesc => out.sort_by(|a, b| name_cmp(&b.name, &a.name)),
        SortOrder::PriceAsc => out.sort_by(|a, b| a.price.total_cmp(&b.price)),
        SortOrder::PriceDesc => out.sort_by(|a, b| b.price.total_cmp(&a.price)),
        SortOrder::StockAsc => out.sort_by_key(|p| p.quantity),
        SortOrder::StockDesc => out.sort_by(|a, b| b.quantity.cmp(&a.quantity)),
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page actually shown (clamped into range).
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

pub fn paginate<T>(items: Vec<T>, page: usize) -> Page<T> {
    let total_items = items.len();
    let total_pages = total_items.div_ceil(PRODUCTS_PER_PAGE);
    let page = page.clamp(1, total_pages.max(1));
    let start = (page - 1) * PRODUCTS_PER_PAGE;
    let items = items
        .into_iter()
        .skip(start)
        .take(PRODUCTS_PER_PAGE)
        .collect();
    Page {
        items,
        page,
        total_pages,
        total_items,
    }
}

/// Search-box suggestions: names containing `term`, prefix matches first,
/// then alphabetical. An empty term yields nothing.
pub fn suggestions<'a>(products: &'a [Product], term: &str) -> Vec<&'a Product> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let mut out: Vec<(bool, &Product)> = products
        .iter()
        .filter_map(|p| {
            let name = p.name.to_lowercase();
            name.contains(&needle)
                .then(|| (name.starts_with(&needle), p))
        })
        .collect();
    out.sort_by(|(a_prefix, a), (b_prefix, b)| {
        b_prefix
            .cmp(a_prefix)
            .then_with(|| name_cmp(&a.name, &b.name))
    });
    out.into_iter().map(|(_, p)| p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: i64, name: &str, price: f64, quantity: u32, sub: i64) -> Product {
        Product {
            id,
            name: name.to_string(),
            price,
            quantity,
            image: None,
            sub_category: Some(sub),
            brand: None,
            color: None,
            size: None,
        }
    }

    fn subs() -> Vec<SubCategory> {
        vec![
            SubCategory {
                id: 10,
                name: "Shirts".into(),
                main_category: 1,
            },
            SubCategory {
                id: 11,
                name: "Pants".into(),
                main_category: 1,
            },
            SubCategory {
                id: 20,
                name: "Caps".into(),
                main_category: 2,
            },
        ]
    }

    fn shelf() -> Vec<Product> {
        vec![
            product(1, "polo shirt", 350.0, 4, 10),
            product(2, "Cargo Pants", 799.0, 0, 11),
            product(3, "Baseball Cap", 250.0, 12, 20),
            product(4, "Plain Shirt", 199.0, 1, 10),
        ]
    }

    fn names(list: &[&Product]) -> Vec<String> {
        list.iter().map(|p| p.name.clone()).collect()
    }

    #[test]
    fn test_default_sort_is_case_insensitive_alphabetical() {
        let items = shelf();
        let out = filter_products(&items, &subs(), &ProductQuery::default());
        assert_eq!(
            names(&out),
            vec!["Baseball Cap", "Cargo Pants", "Plain Shirt", "polo shirt"]
        );
    }

    #[test]
    fn test_main_category_matches_through_sub_categories() {
        let items = shelf();
        let mut q = ProductQuery::default();
        q.select_sub_category(Some(20));
        q.select_main_category(Some(1));
        q.set_sort(SortOrder::PriceDesc);
        let out = filter_products(&items, &subs(), &q);
        assert_eq!(names(&out), vec!["Cargo Pants", "polo shirt", "Plain Shirt"]);
    }

    #[test]
    fn test_stock_filter_toggles_off() {
        let items = shelf();
        let mut q = ProductQuery::default();
        q.toggle_stock(StockFilter::OutOfStock);
        assert_eq!(names(&filter_products(&items, &subs(), &q)), vec!["Cargo Pants"]);
        q.toggle_stock(StockFilter::OutOfStock);
        assert_eq!(q.stock(), StockFilter::All);
        q.toggle_stock(StockFilter::InStock);
        q.set_sort(SortOrder::StockAsc);
        assert_eq!(
            names(&filter_products(&items, &subs(), &q)),
            vec!["Plain Shirt", "polo shirt", "Baseball Cap"]
        );
    }

    #[test]
    fn test_search_is_case_insensitive_and_resets_page() {
        let items = shelf();
        let mut q = ProductQuery::default();
        q.next_page(3);
        assert_eq!(q.page(), 2);
        q.set_search("SHIRT");
        assert_eq!(q.page(), 1);
        assert_eq!(filter_products(&items, &subs(), &q).len(), 2);
    }

    #[test]
    fn test_paginate_nine_per_page_and_clamps() {
        let items: Vec<u32> = (0..20).collect();
        let p = paginate(items.clone(), 3);
        assert_eq!(p.items, vec![18, 19]);
        assert_eq!(p.total_pages, 3);
        let p = paginate(items.clone(), 0);
        assert_eq!(p.page, 1);
        assert_eq!(p.items.len(), 9);
        let p = paginate(items, 99);
        assert_eq!(p.page, 3);
        let empty = paginate(Vec::<u32>::new(), 1);
        assert_eq!(empty.total_pages, 0);
        assert_eq!(empty.page, 1);
        assert!(empty.items.is_empty());
    }

    #[test]
    fn test_page_navigation_stays_in_bounds() {
        let mut q = ProductQuery::default();
        q.previous_page();
        assert_eq!(q.page(), 1);
        q.next_page(2);
        q.next_page(2);
        assert_eq!(q.page(), 2);
    }

    #[tokio::test]
    async fn test_category_tree_loads_both_levels() {
        let backend = crate::backend::mock::MockBackend::new();
        backend.set_categories(
            vec![
                MainCategory {
                    id: 1,
                    name: "Apparel".into(),
                },
                MainCategory {
                    id: 2,
                    name: "Accessories".into(),
                },
            ],
            subs(),
        );

        let tree = CategoryTree::load(&backend).await.expect("categories");
        assert_eq!(tree.main_categories().len(), 2);
        let apparel: Vec<i64> = tree.sub_categories_of(1).map(|s| s.id).collect();
        assert_eq!(apparel, vec![10, 11]);

        let items = shelf();
        let mut q = ProductQuery::default();
        q.select_main_category(Some(2));
        assert_eq!(
            names(&filter_products(&items, tree.sub_categories(), &q)),
            vec!["Baseball Cap"]
        );
    }

    #[tokio::test]
    async fn test_category_tree_load_fails_when_either_list_fails() {
        let backend = crate::backend::mock::MockBackend::new();
        backend.fail("list_sub_categories");
        assert!(CategoryTree::load(&backend).await.is_err());
    }

    #[test]
    fn test_suggestions_prefer_prefix_matches() {
        let items = vec![
            product(1, "Dress Shirt", 1.0, 1, 10),
            product(2, "Shirt Dress", 1.0, 1, 10),
            product(3, "Shirtless Mannequin", 1.0, 1, 10),
            product(4, "Cap", 1.0, 1, 20),
        ];
        let out = suggestions(&items, "shirt");
        assert_eq!(
            names(&out),
            vec!["Shirt Dress", "Shirtless Mannequin", "Dress Shirt"]
        );
        assert!(suggestions(&items, "  ").is_empty());
    }
}

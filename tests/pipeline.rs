use sales_margin::{
    costs, sales, CostMatcher, CostStore, ReportParser, SaleRow, SalesCollection, SqliteStore,
};

fn open_store(dir: &tempfile::TempDir) -> SqliteStore {
    SqliteStore::open(dir.path().join("costs.sqlite")).unwrap()
}

fn find<'a>(sales: &'a SalesCollection, code: &str) -> &'a sales_margin::SalesItem {
    sales.iter().find(|item| item.item_code() == code).unwrap()
}

#[test]
fn report_is_reconciled_against_imported_costs() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    costs::import_costs(&store, "testdata/costs.csv").unwrap();
    store.set_exchange_rate(90.0).unwrap();

    let rows = ReportParser::new().read("testdata/sales_report.csv").unwrap();
    let mut sales = SalesCollection::new(store.exchange_rate().unwrap());
    sales.ingest(rows);
    let summary = CostMatcher::default().fill(&store, &mut sales).unwrap();

    assert_eq!(summary.batches, 1);
    assert_eq!(summary.updated, 2);
    assert_eq!(summary.unmatched, 1);

    let lamp = find(&sales, "LT-100");
    assert_eq!(lamp.sold_price(), 12345.6 / 4.0);
    assert_eq!(lamp.cost_rub(), 25.5 * 90.0);
    let margin = 12345.6 / 4.0 - 25.5 * 90.0;
    assert_eq!(lamp.margin_abs(), margin);
    assert_eq!(lamp.margin_pct(), margin * 100.0 / (25.5 * 90.0));

    let sconce = find(&sales, "LT-200");
    assert_eq!(sconce.cost_usd(), 0.0);
    assert_eq!(sconce.margin_pct(), 0.0);
}

#[test]
fn costs_filled_before_rate_is_set_are_converted_after_recompute() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store
        .upsert_many(&[("LT-300".to_string(), 10.0)])
        .unwrap();

    let rows = ReportParser::new().read("testdata/sales_report.csv").unwrap();
    let mut sales = SalesCollection::new(store.exchange_rate().unwrap());
    sales.ingest(rows);
    CostMatcher::default().fill(&store, &mut sales).unwrap();
    assert_eq!(find(&sales, "LT-300").cost_usd(), 10.0);
    assert_eq!(find(&sales, "LT-300").cost_rub(), 0.0);

    store.set_exchange_rate(90.0).unwrap();
    sales.set_exchange_rate(store.exchange_rate().unwrap());
    assert_eq!(sales.recompute_all(), 1);
    assert_eq!(find(&sales, "LT-300").cost_rub(), 900.0);
    assert_eq!(find(&sales, "LT-300").margin_abs(), 2500.0 - 900.0);
}

#[test]
fn saved_results_read_back_as_the_same_sales() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    costs::import_costs(&store, "testdata/costs.csv").unwrap();
    store.set_exchange_rate(92.5).unwrap();

    let rows = ReportParser::new().read("testdata/sales_report.csv").unwrap();
    let mut original = SalesCollection::new(92.5);
    original.ingest(rows.clone());
    CostMatcher::default().fill(&store, &mut original).unwrap();

    for name in ["margins.csv", "margins.xlsx"] {
        let path = dir.path().join(name);
        original.save(&path).unwrap();
        let read_back: Vec<SaleRow> = sales::read_export(&path).unwrap();
        assert_eq!(read_back, rows, "{name}");

        let mut again = SalesCollection::new(92.5);
        again.ingest(read_back);
        CostMatcher::default().fill(&store, &mut again).unwrap();
        assert_eq!(again.export(), original.export(), "{name}");
    }
}

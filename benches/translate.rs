use command_expr::{
    command::{Command, Query},
    dialect::Dialect,
    expr::{FilterExpression, OrderingExpression},
    operator::{CONTAINS, EQUAL, GREATER_THAN_OR_EQUAL, IN},
    translate::{Translator, odata::ODataTranslator, sql::SqlTranslator},
};
use criterion::{Criterion, criterion_group, criterion_main};

fn customers_query() -> Command {
    Query::new("Customers")
        .with_filter(
            FilterExpression::or()
                .with("Status", &EQUAL, "Premium")
                .with("City", &IN, vec!["NY", "LA", "Chicago", "Boston", "Austin"])
                .with_nested(
                    FilterExpression::and()
                        .with("TotalSpent", &GREATER_THAN_OR_EQUAL, 10_000)
                        .with("IsActive", &EQUAL, true)
                        .with("Name", &CONTAINS, "corp"),
                ),
        )
        .with_ordering(OrderingExpression::new().desc("TotalSpent").asc("Id"))
        .with_paging(100, 50)
        .into()
}

fn criterion_benchmark(c: &mut Criterion) {
    let query = customers_query();
    let sql_server = SqlTranslator::new(Dialect::sql_server());
    let postgres = SqlTranslator::new(Dialect::postgres());
    let odata = ODataTranslator::new("https://example.com/odata");

    c.bench_function("sql server query", |b| {
        b.iter(|| std::hint::black_box(sql_server.translate(&query)))
    });
    c.bench_function("postgres query", |b| {
        b.iter(|| std::hint::black_box(postgres.translate(&query)))
    });
    c.bench_function("odata query", |b| {
        b.iter(|| std::hint::black_box(odata.translate(&query)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

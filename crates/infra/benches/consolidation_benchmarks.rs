//! Benchmarks: journal posting throughput and end-to-end consolidation.

use std::sync::Arc;

use chrono::NaiveDate;
use criterion::{Criterion, criterion_group, criterion_main};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use groupledger_consolidation::{
    Collaborators, CompanyDirectory, ConsolidationGroup, ConsolidationService, GroupMember,
    GroupSource, IntercompanySource, LedgerReader, MatcherConfig, RuleSource, RunOptions,
    RunStatus,
};
use groupledger_core::{TenantId, UserId};
use groupledger_events::{EventBus, EventEnvelope, InMemoryEventBus};
use groupledger_fx::{CurrencyCode, RateProvider, RateTable};
use groupledger_infra::projections::balances::{AccountBalance, BalanceKey};
use groupledger_infra::{
    AccountBalancesProjection, InMemoryCompanyDirectory, InMemoryEventStore, InMemoryGroupSource,
    InMemoryIntercompanySource, InMemoryRuleSource, InMemoryRunStore, InMemoryTenantStore,
    PostingService, ProjectionLedgerReader,
};
use groupledger_journal::{
    Account, AccountId, AccountType, ChartOfAccounts, Company, CompanyId, FiscalPeriod,
    JournalLine, PeriodCalendar, PeriodRef, PeriodStatus,
};

type Bus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;
type Balances = Arc<AccountBalancesProjection<Arc<InMemoryTenantStore<BalanceKey, AccountBalance>>>>;

struct Bench {
    tenant: TenantId,
    posting: PostingService<Arc<InMemoryEventStore>, Bus>,
    subscription: groupledger_events::Subscription<EventEnvelope<serde_json::Value>>,
    balances: Balances,
    service: ConsolidationService<Arc<InMemoryRunStore>>,
    group: ConsolidationGroup,
    company: CompanyId,
    cash: AccountId,
    revenue: AccountId,
    period: PeriodRef,
    as_of: NaiveDate,
}

fn setup() -> Bench {
    let tenant = TenantId::new();
    let period = PeriodRef::new(2025, 6).unwrap();
    let as_of = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();

    let mut chart = ChartOfAccounts::new();
    let cash = chart.insert(Account::new("1000", "Cash", AccountType::Asset));
    let revenue = chart.insert(Account::new("4000", "Revenue", AccountType::Revenue));
    let chart = Arc::new(chart);

    let mut calendar = PeriodCalendar::new();
    calendar.insert(FiscalPeriod {
        reference: period,
        start: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        end: as_of,
        status: PeriodStatus::Open,
    });
    let calendar = Arc::new(calendar);

    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let subscription = bus.subscribe();

    let balances = Arc::new(AccountBalancesProjection::new(Arc::new(
        InMemoryTenantStore::new(),
    )));

    let posting = PostingService::new(store.clone(), bus.clone(), chart.clone(), calendar);

    let usd = CurrencyCode::new("USD").unwrap();
    let company = Company::new("US1", "Parent Inc", usd);
    let company_id = company.id;
    let companies = Arc::new(InMemoryCompanyDirectory::new());
    companies.insert(tenant, company);

    let group = ConsolidationGroup::new(
        "Bench Group",
        usd,
        vec![GroupMember::full(company_id, dec!(100))],
    );
    let groups = Arc::new(InMemoryGroupSource::new());
    groups.insert(tenant, group.clone());

    let ledger = Arc::new(ProjectionLedgerReader::new(balances.clone()));
    let service = ConsolidationService::new(
        Arc::new(InMemoryRunStore::new()),
        chart,
        Collaborators {
            groups: groups as Arc<dyn GroupSource>,
            companies: companies as Arc<dyn CompanyDirectory>,
            ledger: ledger as Arc<dyn LedgerReader>,
            rates: Arc::new(RateTable::new()) as Arc<dyn RateProvider>,
            rules: Arc::new(InMemoryRuleSource::new()) as Arc<dyn RuleSource>,
            intercompany: Arc::new(InMemoryIntercompanySource::new()) as Arc<dyn IntercompanySource>,
        },
        MatcherConfig::default(),
    );

    Bench {
        tenant,
        posting,
        subscription,
        balances,
        service,
        group,
        company: company_id,
        cash,
        revenue,
        period,
        as_of,
    }
}

impl Bench {
    fn post_one(&self) {
        let usd = CurrencyCode::new("USD").unwrap();
        let entry_id = self
            .posting
            .create_draft(
                self.tenant,
                self.company,
                self.period,
                self.as_of,
                None,
                vec![
                    JournalLine::debit(self.cash, dec!(100), usd, Decimal::ONE),
                    JournalLine::credit(self.revenue, dec!(100), usd, Decimal::ONE),
                ],
                UserId::new(),
            )
            .unwrap();
        self.posting.submit(self.tenant, entry_id).unwrap();
        self.posting.approve(self.tenant, entry_id, UserId::new()).unwrap();
        self.posting.post(self.tenant, entry_id).unwrap();
    }

    fn drain(&self) {
        while let Ok(envelope) = self.subscription.try_recv() {
            self.balances.apply_envelope(&envelope).unwrap();
        }
    }
}

fn bench_posting(c: &mut Criterion) {
    let bench = setup();
    c.bench_function("post_journal_entry", |b| {
        b.iter(|| bench.post_one());
    });
}

fn bench_consolidation_run(c: &mut Criterion) {
    let bench = setup();
    for _ in 0..50 {
        bench.post_one();
    }
    bench.drain();

    c.bench_function("full_consolidation_run", |b| {
        b.iter(|| {
            let run = bench
                .service
                .initiate(
                    bench.tenant,
                    bench.group.id,
                    bench.period,
                    bench.as_of,
                    RunOptions {
                        force_regeneration: true,
                        ..RunOptions::default()
                    },
                )
                .unwrap();
            let run = bench.service.execute(bench.tenant, run.id).unwrap();
            assert_eq!(run.status, RunStatus::Completed);
        });
    });
}

criterion_group!(benches, bench_posting, bench_consolidation_run);
criterion_main!(benches);

//! Integration tests for the full engine.
//!
//! Journal side: command -> event store -> bus -> projections -> read
//! models, including concurrent entry-number allocation. Consolidation
//! side: initiate -> execute through all seven steps -> consolidated trial
//! balance, plus the failure, conflict, cancellation and recovery paths.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use anyhow::Result;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use groupledger_core::{TenantId, UserId};
    use groupledger_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription, TenantScoped};
    use groupledger_fx::{CurrencyCode, ExchangeRate, RateProvider, RateTable, RateType};
    use groupledger_journal::{
        Account, AccountId, AccountType, ChartOfAccounts, Company, CompanyId, EntryStatus,
        FiscalPeriod, JournalEntryId, JournalLine, PeriodCalendar, PeriodRef, PeriodStatus,
    };

    use groupledger_consolidation::{
        AccountSelector, Collaborators, CompanyDirectory, ConsolidationGroup,
        ConsolidationService, EliminationRule, EliminationRuleId, EliminationType, GroupMember,
        GroupSource, IntercompanySource, IntercompanyTransaction, LedgerReader, MatcherConfig,
        RuleSource, RunOptions, RunStatus, RunStore, StepStatus, StepType, TriggerConditions,
    };

    use crate::event_store::InMemoryEventStore;
    use crate::posting::PostingService;
    use crate::projections::balances::{AccountBalance, AccountBalancesProjection, BalanceKey};
    use crate::projections::entries::{JournalEntriesProjection, JournalEntryView};
    use crate::read_model::InMemoryTenantStore;
    use crate::run_store::InMemoryRunStore;
    use crate::sources::{
        InMemoryCompanyDirectory, InMemoryGroupSource, InMemoryIntercompanySource,
        InMemoryRuleSource, ProjectionLedgerReader,
    };
    use crate::workers::{RunWorker, RunWorkerConfig};

    type Envelope = EventEnvelope<serde_json::Value>;
    type Store = Arc<InMemoryEventStore>;
    type Bus = Arc<InMemoryEventBus<Envelope>>;
    type Balances =
        Arc<AccountBalancesProjection<Arc<InMemoryTenantStore<BalanceKey, AccountBalance>>>>;
    type Entries =
        Arc<JournalEntriesProjection<Arc<InMemoryTenantStore<JournalEntryId, JournalEntryView>>>>;

    struct ChartIds {
        cash: AccountId,
        ic_receivable: AccountId,
        ic_payable: AccountId,
        revenue: AccountId,
        expense: AccountId,
        nci: AccountId,
    }

    struct World {
        tenant: TenantId,
        posting: Arc<PostingService<Store, Bus>>,
        subscription: Subscription<Envelope>,
        balances: Balances,
        entries: Entries,
        service: Arc<ConsolidationService<Arc<InMemoryRunStore>>>,
        run_store: Arc<InMemoryRunStore>,
        rules: Arc<InMemoryRuleSource>,
        intercompany: Arc<InMemoryIntercompanySource>,
        group: ConsolidationGroup,
        accounts: ChartIds,
        parent: CompanyId,
        sub: CompanyId,
        period: PeriodRef,
        as_of: NaiveDate,
    }

    fn usd() -> CurrencyCode {
        CurrencyCode::new("USD").unwrap()
    }

    fn eur() -> CurrencyCode {
        CurrencyCode::new("EUR").unwrap()
    }

    fn build_world(rates: RateTable) -> World {
        let tenant = TenantId::new();
        let period = PeriodRef::new(2025, 6).unwrap();
        let as_of = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();

        let mut chart = ChartOfAccounts::new();
        let accounts = ChartIds {
            cash: chart.insert(Account::new("1000", "Cash", AccountType::Asset)),
            ic_receivable: chart
                .insert(Account::new("1200", "IC Receivable", AccountType::Asset).intercompany()),
            ic_payable: chart
                .insert(Account::new("2200", "IC Payable", AccountType::Liability).intercompany()),
            revenue: chart.insert(Account::new("4000", "Revenue", AccountType::Revenue)),
            expense: chart.insert(Account::new("5000", "Operating Expense", AccountType::Expense)),
            nci: chart.insert(Account::new(
                "3900",
                "Non-controlling interest",
                AccountType::Equity,
            )),
        };
        let chart = Arc::new(chart);

        let mut calendar = PeriodCalendar::new();
        calendar.insert(FiscalPeriod {
            reference: period,
            start: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            end: as_of,
            status: PeriodStatus::Open,
        });
        let closed = PeriodRef::new(2025, 5).unwrap();
        calendar.insert(FiscalPeriod {
            reference: closed,
            start: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2025, 5, 31).unwrap(),
            status: PeriodStatus::Closed,
        });
        let calendar = Arc::new(calendar);

        let store: Store = Arc::new(InMemoryEventStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        // Subscribe before any command so no event is missed.
        let subscription = bus.subscribe();

        let balances: Balances = Arc::new(AccountBalancesProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));
        let entries: Entries = Arc::new(JournalEntriesProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));

        let posting = Arc::new(PostingService::new(
            store.clone(),
            bus.clone(),
            chart.clone(),
            calendar.clone(),
        ));

        let parent_company = Company::new("US1", "Parent Inc", usd());
        let sub_company = Company::new("DE1", "Sub GmbH", eur());
        let parent = parent_company.id;
        let sub = sub_company.id;

        let companies = Arc::new(InMemoryCompanyDirectory::new());
        companies.insert(tenant, parent_company);
        companies.insert(tenant, sub_company);

        let mut group = ConsolidationGroup::new(
            "Worldwide Group",
            usd(),
            vec![GroupMember::full(parent, dec!(100)), GroupMember::full(sub, dec!(80))],
        );
        group.nci_equity_account = Some(accounts.nci);

        let groups = Arc::new(InMemoryGroupSource::new());
        groups.insert(tenant, group.clone());

        let rules = Arc::new(InMemoryRuleSource::new());
        let intercompany = Arc::new(InMemoryIntercompanySource::new());
        let ledger: Arc<ProjectionLedgerReader<_>> =
            Arc::new(ProjectionLedgerReader::new(balances.clone()));

        let run_store = Arc::new(InMemoryRunStore::new());
        let service = Arc::new(ConsolidationService::new(
            run_store.clone(),
            chart,
            Collaborators {
                groups: groups as Arc<dyn GroupSource>,
                companies: companies as Arc<dyn CompanyDirectory>,
                ledger: ledger as Arc<dyn LedgerReader>,
                rates: Arc::new(rates) as Arc<dyn RateProvider>,
                rules: rules.clone() as Arc<dyn RuleSource>,
                intercompany: intercompany.clone() as Arc<dyn IntercompanySource>,
            },
            MatcherConfig::default(),
        ));

        World {
            tenant,
            posting,
            subscription,
            balances,
            entries,
            service,
            run_store,
            rules,
            intercompany,
            group,
            accounts,
            parent,
            sub,
            period,
            as_of,
        }
    }

    /// EUR->USD at 1.25 for both closing and average: no translation
    /// difference, so a balanced EUR ledger stays balanced in USD.
    fn standard_rates() -> RateTable {
        let mut rates = RateTable::new();
        for rate_type in [RateType::PeriodClosing, RateType::PeriodAverage] {
            rates.insert(ExchangeRate {
                from: eur(),
                to: usd(),
                rate_type,
                effective_date: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
                rate: dec!(1.25),
            });
        }
        rates
    }

    impl World {
        /// Drain the bus into both projections (deterministic, no sleeps).
        /// Tenant-pinned, like a projection worker would be.
        fn drain(&self) {
            while let Ok(envelope) = self.subscription.try_recv() {
                if TenantScoped::tenant_id(&envelope) != self.tenant {
                    continue;
                }
                self.balances.apply_envelope(&envelope).unwrap();
                self.entries.apply_envelope(&envelope).unwrap();
            }
        }

        /// Draft -> submit -> approve -> post; returns (entry id, number).
        fn post_entry(
            &self,
            company: CompanyId,
            lines: Vec<JournalLine>,
        ) -> Result<(JournalEntryId, u64)> {
            let entry_id = self.posting.create_draft(
                self.tenant,
                company,
                self.period,
                self.as_of,
                None,
                lines,
                UserId::new(),
            )?;
            self.posting.submit(self.tenant, entry_id)?;
            self.posting.approve(self.tenant, entry_id, UserId::new())?;
            let number = self.posting.post(self.tenant, entry_id)?;
            Ok((entry_id, number))
        }

        /// Seed the books for the consolidation scenario:
        /// - parent (USD): cash sale 100, intercompany sale 30 on account;
        /// - sub (EUR): cash sale 80, intercompany purchase 24 (= 30 USD).
        fn seed_books(&self) -> Result<()> {
            self.post_entry(
                self.parent,
                vec![
                    JournalLine::debit(self.accounts.cash, dec!(100), usd(), Decimal::ONE),
                    JournalLine::credit(self.accounts.revenue, dec!(100), usd(), Decimal::ONE),
                ],
            )?;
            self.post_entry(
                self.parent,
                vec![
                    JournalLine::debit(self.accounts.ic_receivable, dec!(30), usd(), Decimal::ONE),
                    JournalLine::credit(self.accounts.revenue, dec!(30), usd(), Decimal::ONE),
                ],
            )?;
            self.post_entry(
                self.sub,
                vec![
                    JournalLine::debit(self.accounts.cash, dec!(80), eur(), Decimal::ONE),
                    JournalLine::credit(self.accounts.revenue, dec!(80), eur(), Decimal::ONE),
                ],
            )?;
            self.post_entry(
                self.sub,
                vec![
                    JournalLine::debit(self.accounts.expense, dec!(24), eur(), Decimal::ONE),
                    JournalLine::credit(self.accounts.ic_payable, dec!(24), eur(), Decimal::ONE),
                ],
            )?;
            self.drain();
            Ok(())
        }

        fn seed_intercompany(&self) {
            self.intercompany.insert(
                self.tenant,
                self.group.id,
                self.period,
                IntercompanyTransaction::new(self.parent, self.sub, dec!(30), usd()),
            );
            self.intercompany.insert(
                self.tenant,
                self.group.id,
                self.period,
                IntercompanyTransaction::new(self.sub, self.parent, dec!(30), usd()),
            );
        }

        fn seed_elimination_rule(&self) -> EliminationRuleId {
            let rule = EliminationRule {
                id: EliminationRuleId::new(),
                group_id: self.group.id,
                name: "Intercompany AR/AP".to_string(),
                elimination_type: EliminationType::ReceivablePayable,
                trigger: TriggerConditions {
                    source_accounts: vec![AccountSelector::ById {
                        account_id: self.accounts.ic_receivable,
                    }],
                    minimum_amount: None,
                },
                source_accounts: Vec::new(),
                target_accounts: Vec::new(),
                debit_account_id: self.accounts.ic_payable,
                credit_account_id: self.accounts.ic_receivable,
                is_automatic: true,
                priority: 10,
                is_active: true,
                created_at: Utc::now(),
            };
            let id = rule.id;
            self.rules.insert(self.tenant, rule);
            id
        }
    }

    // ------------------------------------------------------------------
    // Journal ledger
    // ------------------------------------------------------------------

    #[test]
    fn posting_updates_balances_and_entry_views() -> Result<()> {
        let world = build_world(standard_rates());

        let (entry_id, number) = world.post_entry(
            world.parent,
            vec![
                JournalLine::debit(world.accounts.cash, dec!(250), usd(), Decimal::ONE),
                JournalLine::credit(world.accounts.revenue, dec!(250), usd(), Decimal::ONE),
            ],
        )?;
        world.drain();

        assert_eq!(number, 1);

        let view = world.entries.get(world.tenant, &entry_id).unwrap();
        assert_eq!(view.status, EntryStatus::Posted);
        assert_eq!(view.entry_number, Some(1));

        let balances = world
            .balances
            .balances_for(world.tenant, world.parent, world.period);
        let cash = balances
            .iter()
            .find(|b| b.account_id == world.accounts.cash)
            .unwrap();
        assert_eq!(cash.debit_total, dec!(250));
        assert_eq!(cash.credit_total, Decimal::ZERO);
        Ok(())
    }

    #[test]
    fn entry_numbers_are_unique_and_gapless_under_concurrent_posting() {
        let world = Arc::new(build_world(standard_rates()));
        let threads = 4;
        let per_thread = 3;

        let mut handles = Vec::new();
        for _ in 0..threads {
            let world = world.clone();
            handles.push(std::thread::spawn(move || {
                let mut numbers = Vec::new();
                for _ in 0..per_thread {
                    let (_, number) = world
                        .post_entry(
                            world.parent,
                            vec![
                                JournalLine::debit(
                                    world.accounts.cash,
                                    dec!(10),
                                    usd(),
                                    Decimal::ONE,
                                ),
                                JournalLine::credit(
                                    world.accounts.revenue,
                                    dec!(10),
                                    usd(),
                                    Decimal::ONE,
                                ),
                            ],
                        )
                        .unwrap();
                    numbers.push(number);
                }
                numbers
            }));
        }

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();

        // Strictly increasing per company, never reused.
        let expected: Vec<u64> = (1..=(threads * per_thread) as u64).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn reversal_nets_balances_and_cross_links_views() -> Result<()> {
        let world = build_world(standard_rates());

        let (entry_id, _) = world.post_entry(
            world.parent,
            vec![
                JournalLine::debit(world.accounts.cash, dec!(75), usd(), Decimal::ONE),
                JournalLine::credit(world.accounts.revenue, dec!(75), usd(), Decimal::ONE),
            ],
        )?;
        let reversing_id =
            world
                .posting
                .reverse(world.tenant, entry_id, Some("posted twice".to_string()))?;
        world.drain();

        let original = world.entries.get(world.tenant, &entry_id).unwrap();
        assert_eq!(original.status, EntryStatus::Reversed);
        assert_eq!(original.reversing_entry_id, Some(reversing_id));
        assert_eq!(original.reversed_entry_id, None);

        let reversing = world.entries.get(world.tenant, &reversing_id).unwrap();
        assert_eq!(reversing.status, EntryStatus::Posted);
        assert_eq!(reversing.entry_number, Some(2));
        assert_eq!(reversing.reversed_entry_id, Some(entry_id));
        assert_eq!(reversing.reversing_entry_id, None);
        for (orig, rev) in original.lines.iter().zip(&reversing.lines) {
            assert_eq!(orig.debit, rev.credit);
            assert_eq!(orig.credit, rev.debit);
        }

        // Balances net to zero.
        for balance in world
            .balances
            .balances_for(world.tenant, world.parent, world.period)
        {
            assert_eq!(balance.debit_total, balance.credit_total);
        }
        Ok(())
    }

    #[test]
    fn posting_into_a_closed_period_is_rejected() {
        let world = build_world(standard_rates());
        let closed = PeriodRef::new(2025, 5).unwrap();

        let entry_id = world
            .posting
            .create_draft(
                world.tenant,
                world.parent,
                closed,
                NaiveDate::from_ymd_opt(2025, 5, 15).unwrap(),
                None,
                vec![
                    JournalLine::debit(world.accounts.cash, dec!(10), usd(), Decimal::ONE),
                    JournalLine::credit(world.accounts.revenue, dec!(10), usd(), Decimal::ONE),
                ],
                UserId::new(),
            )
            .unwrap();
        world.posting.submit(world.tenant, entry_id).unwrap();
        world
            .posting
            .approve(world.tenant, entry_id, UserId::new())
            .unwrap();

        let err = world.posting.post(world.tenant, entry_id).unwrap_err();
        assert!(err.to_string().contains("not open"), "{err}");
    }

    #[test]
    fn posting_with_unknown_account_is_rejected() {
        let world = build_world(standard_rates());

        let entry_id = world
            .posting
            .create_draft(
                world.tenant,
                world.parent,
                world.period,
                world.as_of,
                None,
                vec![
                    JournalLine::debit(AccountId::new(), dec!(10), usd(), Decimal::ONE),
                    JournalLine::credit(world.accounts.revenue, dec!(10), usd(), Decimal::ONE),
                ],
                UserId::new(),
            )
            .unwrap();
        world.posting.submit(world.tenant, entry_id).unwrap();
        world
            .posting
            .approve(world.tenant, entry_id, UserId::new())
            .unwrap();

        let err = world.posting.post(world.tenant, entry_id).unwrap_err();
        assert!(err.to_string().contains("missing from the chart"), "{err}");
    }

    // ------------------------------------------------------------------
    // Consolidation pipeline
    // ------------------------------------------------------------------

    #[test]
    fn full_consolidation_run_produces_a_balanced_trial_balance() -> Result<()> {
        let world = build_world(standard_rates());
        world.seed_books()?;
        world.seed_intercompany();
        world.seed_elimination_rule();

        let run = world.service.initiate(
            world.tenant,
            world.group.id,
            world.period,
            world.as_of,
            RunOptions::default(),
        )?;
        let run = world.service.execute(world.tenant, run.id)?;

        assert_eq!(run.status, RunStatus::Completed);
        for step in &run.steps {
            assert_eq!(step.status, StepStatus::Completed, "{:?}", step.step_type);
            assert!(step.duration_ms.is_some());
        }

        let tb = world.service.trial_balance(world.tenant, run.id)?;
        assert!(tb.is_balanced);
        assert_eq!(tb.total_debits, tb.total_credits);
        assert_eq!(tb.total_eliminations, dec!(30));
        // 20% of the sub's USD net income (100 revenue - 30 expenses).
        assert_eq!(tb.total_nci, dec!(14.00));
        assert!(tb.pending_eliminations.is_empty());

        // Intercompany positions are fully eliminated.
        let receivable = tb.line(world.accounts.ic_receivable).unwrap();
        assert_eq!(receivable.aggregated_balance, dec!(30));
        assert_eq!(receivable.elimination_amount, dec!(30));
        assert_eq!(receivable.consolidated_balance, Decimal::ZERO);
        let payable = tb.line(world.accounts.ic_payable).unwrap();
        assert_eq!(payable.consolidated_balance, Decimal::ZERO);

        // Cash: parent 100 + sub 80 EUR @ 1.25.
        let cash = tb.line(world.accounts.cash).unwrap();
        assert_eq!(cash.consolidated_balance, dec!(200.00));

        // Revenue: 230 aggregated minus the 20 outside share of the sub's.
        let revenue = tb.line(world.accounts.revenue).unwrap();
        assert_eq!(revenue.aggregated_balance, dec!(230.00));
        assert_eq!(revenue.nci_amount, dec!(20.00));
        assert_eq!(revenue.consolidated_balance, dec!(210.00));

        // The outside interest lands on the configured equity line.
        let nci_line = tb.line(world.accounts.nci).unwrap();
        assert_eq!(nci_line.consolidated_balance, dec!(14.00));
        Ok(())
    }

    #[test]
    fn missing_rate_fails_translate_and_skips_the_rest() -> Result<()> {
        let world = build_world(RateTable::new());
        world.seed_books()?;

        let run = world.service.initiate(
            world.tenant,
            world.group.id,
            world.period,
            world.as_of,
            RunOptions::default(),
        )?;
        let run = world.service.execute(world.tenant, run.id)?;

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error_message.as_deref().unwrap_or("").contains("FX_RATE_MISSING"));

        assert_eq!(run.step(StepType::Validate).status, StepStatus::Completed);
        assert_eq!(run.step(StepType::Translate).status, StepStatus::Failed);
        for later in [
            StepType::Aggregate,
            StepType::MatchIntercompany,
            StepType::Eliminate,
            StepType::Nci,
            StepType::GenerateTrialBalance,
        ] {
            assert_eq!(run.step(later).status, StepStatus::Skipped);
        }

        assert!(world.service.trial_balance(world.tenant, run.id).is_err());
        Ok(())
    }

    /// Different closing and average rates create a translation difference,
    /// so the aggregate no longer balances. By default that halts the run;
    /// with skip_validation the caller accepts the degraded output.
    #[test]
    fn translation_difference_halts_unless_degraded_output_accepted() -> Result<()> {
        let mut rates = RateTable::new();
        rates.insert(ExchangeRate {
            from: eur(),
            to: usd(),
            rate_type: RateType::PeriodClosing,
            effective_date: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            rate: dec!(1.10),
        });
        rates.insert(ExchangeRate {
            from: eur(),
            to: usd(),
            rate_type: RateType::PeriodAverage,
            effective_date: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            rate: dec!(1.25),
        });
        let world = build_world(rates);
        world.seed_books()?;

        let run = world.service.initiate(
            world.tenant,
            world.group.id,
            world.period,
            world.as_of,
            RunOptions::default(),
        )?;
        let run = world.service.execute(world.tenant, run.id)?;
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.step(StepType::Aggregate).status, StepStatus::Failed);
        assert!(
            run.error_message
                .as_deref()
                .unwrap_or("")
                .contains("TB_OUT_OF_BALANCE")
        );

        let degraded = world.service.initiate(
            world.tenant,
            world.group.id,
            world.period,
            world.as_of,
            RunOptions {
                skip_validation: true,
                continue_on_warnings: true,
                ..RunOptions::default()
            },
        )?;
        let degraded = world.service.execute(world.tenant, degraded.id)?;
        assert_eq!(degraded.status, RunStatus::Completed);
        assert!(degraded.warnings.iter().any(|w| w.code == "TB_OUT_OF_BALANCE"));

        let tb = world.service.trial_balance(world.tenant, degraded.id)?;
        assert!(!tb.is_balanced);
        Ok(())
    }

    #[test]
    fn duplicate_and_completed_runs_conflict_until_forced() -> Result<()> {
        let world = build_world(standard_rates());
        world.seed_books()?;
        world.seed_intercompany();
        world.seed_elimination_rule();

        let first = world.service.initiate(
            world.tenant,
            world.group.id,
            world.period,
            world.as_of,
            RunOptions::default(),
        )?;

        // In flight (Pending or InProgress) blocks a second initiation.
        let claimed = world.run_store.claim_next_pending(Some(world.tenant))?.unwrap();
        assert_eq!(claimed.id, first.id);
        let err = world
            .service
            .initiate(
                world.tenant,
                world.group.id,
                world.period,
                world.as_of,
                RunOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, groupledger_core::DomainError::Conflict(_)));

        let first = world.service.execute_claimed(claimed)?;
        assert_eq!(first.status, RunStatus::Completed);

        // Completed blocks re-initiation without the force option.
        let err = world
            .service
            .initiate(
                world.tenant,
                world.group.id,
                world.period,
                world.as_of,
                RunOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, groupledger_core::DomainError::Conflict(_)));

        let forced = world.service.initiate(
            world.tenant,
            world.group.id,
            world.period,
            world.as_of,
            RunOptions {
                force_regeneration: true,
                ..RunOptions::default()
            },
        )?;
        let forced = world.service.execute(world.tenant, forced.id)?;
        assert_eq!(forced.status, RunStatus::Completed);

        let latest = world
            .service
            .latest_completed(world.tenant, world.group.id)?
            .unwrap();
        assert_eq!(latest.id, forced.id);
        Ok(())
    }

    #[test]
    fn cancellation_is_honored_at_the_step_boundary() -> Result<()> {
        let world = build_world(standard_rates());
        world.seed_books()?;

        // Pending run cancels immediately.
        let pending = world.service.initiate(
            world.tenant,
            world.group.id,
            world.period,
            world.as_of,
            RunOptions::default(),
        )?;
        let cancelled = world.service.cancel(world.tenant, pending.id)?;
        assert_eq!(cancelled.status, RunStatus::Cancelled);
        assert!(cancelled.steps.iter().all(|s| s.status == StepStatus::Skipped));

        // A claimed run records the request and stops at the next boundary.
        let run = world.service.initiate(
            world.tenant,
            world.group.id,
            world.period,
            world.as_of,
            RunOptions::default(),
        )?;
        let claimed = world.run_store.claim_next_pending(Some(world.tenant))?.unwrap();
        assert_eq!(claimed.id, run.id);

        let requested = world.service.cancel(world.tenant, run.id)?;
        assert_eq!(requested.status, RunStatus::InProgress);
        assert!(requested.cancel_requested);

        let finished = world.service.execute_claimed(claimed)?;
        assert_eq!(finished.status, RunStatus::Cancelled);
        // No step ran: the request predated the first boundary.
        assert!(finished.steps.iter().all(|s| s.status == StepStatus::Skipped));

        // Terminal runs reject cancellation.
        assert!(world.service.cancel(world.tenant, run.id).is_err());
        Ok(())
    }

    #[test]
    fn interrupted_runs_are_recovered_as_failed() -> Result<()> {
        let world = build_world(standard_rates());
        world.seed_books()?;

        let run = world.service.initiate(
            world.tenant,
            world.group.id,
            world.period,
            world.as_of,
            RunOptions::default(),
        )?;
        // Claimed, then the process "restarts" before executing.
        world.run_store.claim_next_pending(Some(world.tenant))?.unwrap();

        let recovered = world.service.recover_interrupted(world.tenant)?;
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].id, run.id);
        assert_eq!(recovered[0].status, RunStatus::Failed);
        assert!(
            recovered[0]
                .error_message
                .as_deref()
                .unwrap_or("")
                .contains("interrupted")
        );
        Ok(())
    }

    #[test]
    fn background_worker_drives_a_run_to_completion() -> Result<()> {
        let world = build_world(standard_rates());
        world.seed_books()?;
        world.seed_intercompany();
        world.seed_elimination_rule();

        let handle = RunWorker::spawn(
            world.service.clone(),
            world.run_store.clone(),
            RunWorkerConfig {
                tenant_id: Some(world.tenant),
                ..RunWorkerConfig::default()
            },
        );

        let run = world.service.initiate(
            world.tenant,
            world.group.id,
            world.period,
            world.as_of,
            RunOptions::default(),
        )?;

        let deadline = Instant::now() + Duration::from_secs(5);
        let finished = loop {
            let current = world.service.get(world.tenant, run.id)?;
            if current.is_terminal() {
                break current;
            }
            if Instant::now() > deadline {
                panic!("run did not finish in time: {:?}", current.status);
            }
            std::thread::sleep(Duration::from_millis(10));
        };
        handle.shutdown();

        assert_eq!(finished.status, RunStatus::Completed);
        assert!(finished.trial_balance.unwrap().is_balanced);
        Ok(())
    }

    #[test]
    fn deactivated_rules_skip_future_runs_but_history_is_untouched() -> Result<()> {
        let world = build_world(standard_rates());
        world.seed_books()?;
        world.seed_intercompany();
        let rule_id = world.seed_elimination_rule();

        let first = world.service.initiate(
            world.tenant,
            world.group.id,
            world.period,
            world.as_of,
            RunOptions::default(),
        )?;
        let first = world.service.execute(world.tenant, first.id)?;
        assert_eq!(first.status, RunStatus::Completed);
        let first_tb = world.service.trial_balance(world.tenant, first.id)?;
        assert_eq!(first_tb.total_eliminations, dec!(30));

        world.rules.set_active(world.tenant, rule_id, false);

        let second = world.service.initiate(
            world.tenant,
            world.group.id,
            world.period,
            world.as_of,
            RunOptions {
                force_regeneration: true,
                ..RunOptions::default()
            },
        )?;
        let second = world.service.execute(world.tenant, second.id)?;
        let second_tb = world.service.trial_balance(world.tenant, second.id)?;
        assert_eq!(second_tb.total_eliminations, Decimal::ZERO);

        // The historical run still carries its eliminations.
        let historical = world.service.trial_balance(world.tenant, first.id)?;
        assert_eq!(historical.total_eliminations, dec!(30));
        Ok(())
    }

    #[test]
    fn unknown_group_is_not_found() {
        let world = build_world(standard_rates());
        let err = world
            .service
            .initiate(
                world.tenant,
                groupledger_consolidation::ConsolidationGroupId::new(),
                world.period,
                world.as_of,
                RunOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, groupledger_core::DomainError::NotFound));
    }
}

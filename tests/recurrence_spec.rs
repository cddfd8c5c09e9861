use chrono::NaiveDate;
use speculate2::speculate;
use taskmill::db::Database;
use taskmill::models::*;
use taskmill::recurrence::{materialize, next_occurrence, GenerationConfig, RecurrenceEngine};
use uuid::Uuid;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// A recurring parent template created on `created` (09:00 UTC), with no
/// watermark and no due date unless the test sets them.
fn template(
    user_id: Uuid,
    recurrence: RecurrenceKind,
    rule: RecurrenceRule,
    created: NaiveDate,
) -> Task {
    let created_at = created
        .and_hms_opt(9, 0, 0)
        .expect("valid time")
        .and_utc();
    Task {
        id: Uuid::new_v4(),
        user_id,
        text: "Water the plants".to_string(),
        description: String::new(),
        priority: Priority::Medium,
        tags: vec![],
        subtasks: vec![],
        due_date: None,
        reminder_time: None,
        completed: false,
        completed_at: None,
        recurrence,
        recurrence_rule: rule,
        last_generated_at: None,
        is_instance: false,
        parent_id: None,
        is_archived: false,
        pinned: false,
        display_order: 0,
        created_at,
        updated_at: created_at,
    }
}

fn weekly_rule(day_of_week: u32) -> RecurrenceRule {
    RecurrenceRule {
        day_of_week: Some(day_of_week),
        ..Default::default()
    }
}

fn monthly_rule(day_of_month: u32) -> RecurrenceRule {
    RecurrenceRule {
        day_of_month: Some(day_of_month),
        ..Default::default()
    }
}

speculate! {
    describe "next_occurrence" {
        describe "daily" {
            it "advances by exactly one day" {
                let next = next_occurrence(date(2024, 3, 5), RecurrenceKind::Daily, &RecurrenceRule::default());
                assert_eq!(next, Some(date(2024, 3, 6)));
            }

            it "crosses month boundaries" {
                let next = next_occurrence(date(2024, 2, 29), RecurrenceKind::Daily, &RecurrenceRule::default());
                assert_eq!(next, Some(date(2024, 3, 1)));
            }
        }

        describe "weekly" {
            it "advances by one week without a target weekday" {
                let next = next_occurrence(date(2024, 1, 1), RecurrenceKind::Weekly, &RecurrenceRule::default());
                assert_eq!(next, Some(date(2024, 1, 8)));
            }

            it "snaps a monday anchor to the following wednesday" {
                // 2024-01-01 is a Monday; dayOfWeek 3 = Wednesday.
                let next = next_occurrence(date(2024, 1, 1), RecurrenceKind::Weekly, &weekly_rule(3));
                assert_eq!(next, Some(date(2024, 1, 3)));
            }

            it "keeps a weekly cadence once aligned" {
                // 2024-01-03 is already a Wednesday.
                let next = next_occurrence(date(2024, 1, 3), RecurrenceKind::Weekly, &weekly_rule(3));
                assert_eq!(next, Some(date(2024, 1, 10)));
            }

            it "lands on the next target weekday from any anchor" {
                // 2024-01-06 is a Saturday; the next Wednesday is Jan 10.
                let next = next_occurrence(date(2024, 1, 6), RecurrenceKind::Weekly, &weekly_rule(3));
                assert_eq!(next, Some(date(2024, 1, 10)));
            }
        }

        describe "monthly" {
            it "moves to the same day next month without a rule" {
                let next = next_occurrence(date(2024, 1, 15), RecurrenceKind::Monthly, &RecurrenceRule::default());
                assert_eq!(next, Some(date(2024, 2, 15)));
            }

            it "clamps day 31 to the end of a non-leap february" {
                let next = next_occurrence(date(2023, 1, 31), RecurrenceKind::Monthly, &monthly_rule(31));
                assert_eq!(next, Some(date(2023, 2, 28)));
            }

            it "clamps day 31 to february 29 in a leap year" {
                let next = next_occurrence(date(2024, 1, 31), RecurrenceKind::Monthly, &monthly_rule(31));
                assert_eq!(next, Some(date(2024, 2, 29)));
            }

            it "rolls back out to day 31 in march instead of stalling" {
                let next = next_occurrence(date(2023, 2, 28), RecurrenceKind::Monthly, &monthly_rule(31));
                assert_eq!(next, Some(date(2023, 3, 31)));
            }
        }

        describe "yearly" {
            it "advances one year" {
                let next = next_occurrence(date(2023, 6, 15), RecurrenceKind::Yearly, &RecurrenceRule::default());
                assert_eq!(next, Some(date(2024, 6, 15)));
            }

            it "applies month and day overrides with clamping" {
                // month 1 = February (0-11), day 31 clamps to the 29th in 2024.
                let rule = RecurrenceRule {
                    month: Some(1),
                    day_of_month: Some(31),
                    ..Default::default()
                };
                let next = next_occurrence(date(2023, 6, 15), RecurrenceKind::Yearly, &rule);
                assert_eq!(next, Some(date(2024, 2, 29)));
            }

            it "handles a february 29 anchor" {
                let next = next_occurrence(date(2024, 2, 29), RecurrenceKind::Yearly, &RecurrenceRule::default());
                assert_eq!(next, Some(date(2025, 2, 28)));
            }
        }

        describe "none" {
            it "yields no further occurrences" {
                assert_eq!(next_occurrence(date(2024, 1, 1), RecurrenceKind::None, &RecurrenceRule::default()), None);
            }
        }

        describe "determinism and forward progress" {
            it "returns identical output for identical inputs" {
                let rule = RecurrenceRule {
                    day_of_week: Some(2),
                    day_of_month: Some(31),
                    month: Some(6),
                };
                for kind in [RecurrenceKind::Daily, RecurrenceKind::Weekly, RecurrenceKind::Monthly, RecurrenceKind::Yearly] {
                    let first = next_occurrence(date(2024, 1, 31), kind, &rule);
                    let second = next_occurrence(date(2024, 1, 31), kind, &rule);
                    assert_eq!(first, second);
                }
            }

            it "always lands strictly after the reference date" {
                let rules = [
                    RecurrenceRule::default(),
                    weekly_rule(0),
                    weekly_rule(6),
                    monthly_rule(1),
                    monthly_rule(31),
                    RecurrenceRule { month: Some(0), day_of_month: Some(29), ..Default::default() },
                ];
                let mut reference = date(2023, 12, 25);
                for _ in 0..60 {
                    for kind in [RecurrenceKind::Daily, RecurrenceKind::Weekly, RecurrenceKind::Monthly, RecurrenceKind::Yearly] {
                        for rule in &rules {
                            if let Some(next) = next_occurrence(reference, kind, rule) {
                                assert!(next > reference, "{:?} with {:?} from {} gave {}", kind, rule, reference, next);
                            }
                        }
                    }
                    reference = reference.succ_opt().expect("valid date");
                }
            }
        }
    }

    describe "materialize" {
        it "resets completion state on copied subtasks" {
            let mut parent = template(Uuid::new_v4(), RecurrenceKind::Daily, RecurrenceRule::default(), date(2024, 1, 1));
            parent.subtasks = vec![
                Subtask { text: "Fill can".to_string(), completed: true },
                Subtask { text: "Water ferns".to_string(), completed: false },
            ];
            parent.completed = false;

            let instance = materialize(&parent, date(2024, 1, 5), parent.created_at);
            assert_eq!(instance.subtasks.len(), 2);
            assert!(instance.subtasks.iter().all(|st| !st.completed));
            assert!(!instance.completed);
            assert!(instance.completed_at.is_none());
        }

        it "re-anchors the reminder on the occurrence day" {
            let mut parent = template(Uuid::new_v4(), RecurrenceKind::Daily, RecurrenceRule::default(), date(2024, 1, 1));
            parent.reminder_time = Some(
                date(2024, 1, 1).and_hms_opt(18, 30, 15).expect("valid time").and_utc(),
            );

            let instance = materialize(&parent, date(2024, 1, 5), parent.created_at);
            assert_eq!(
                instance.reminder_time,
                Some(date(2024, 1, 5).and_hms_opt(18, 30, 15).expect("valid time").and_utc()),
            );
        }

        it "links the instance to its parent with inert recurrence" {
            let parent = template(Uuid::new_v4(), RecurrenceKind::Weekly, weekly_rule(3), date(2024, 1, 1));

            let instance = materialize(&parent, date(2024, 1, 3), parent.created_at);
            assert!(instance.is_instance);
            assert_eq!(instance.parent_id, Some(parent.id));
            assert_eq!(instance.due_date, Some(date(2024, 1, 3)));
            assert_eq!(instance.recurrence, RecurrenceKind::None);
            assert!(instance.last_generated_at.is_none());
            assert_ne!(instance.id, parent.id);
        }
    }

    describe "generation driver" {
        before {
            let db = Database::open_memory().expect("Failed to create in-memory database");
            db.migrate().expect("Failed to run migrations");
            let engine = RecurrenceEngine::new(db.clone(), GenerationConfig::default());
            let user_id = Uuid::new_v4();
        }

        it "catches up a daily parent five days behind" {
            let mut parent = template(user_id, RecurrenceKind::Daily, RecurrenceRule::default(), date(2024, 3, 1));
            parent.last_generated_at = Some(date(2024, 3, 5));
            db.insert_task(&parent).expect("Failed to insert parent");

            let report = engine.run(date(2024, 3, 10)).expect("Run failed");
            assert_eq!(report.eligible_parents, 1);
            assert_eq!(report.instances_created, 5);
            assert_eq!(report.failed_parents, 0);

            let instances = db.instances_of(parent.id).expect("Query failed");
            let due: Vec<_> = instances.iter().filter_map(|t| t.due_date).collect();
            assert_eq!(due, vec![
                date(2024, 3, 6),
                date(2024, 3, 7),
                date(2024, 3, 8),
                date(2024, 3, 9),
                date(2024, 3, 10),
            ]);

            let parent = db.get_task(user_id, parent.id).expect("Query failed").expect("Parent missing");
            assert_eq!(parent.last_generated_at, Some(date(2024, 3, 10)));
        }

        it "is idempotent within a day" {
            let mut parent = template(user_id, RecurrenceKind::Daily, RecurrenceRule::default(), date(2024, 3, 1));
            parent.last_generated_at = Some(date(2024, 3, 8));
            db.insert_task(&parent).expect("Failed to insert parent");

            let first = engine.run(date(2024, 3, 10)).expect("Run failed");
            assert_eq!(first.instances_created, 2);

            let second = engine.run(date(2024, 3, 10)).expect("Run failed");
            assert_eq!(second.eligible_parents, 0);
            assert_eq!(second.instances_created, 0);

            let instances = db.instances_of(parent.id).expect("Query failed");
            assert_eq!(instances.len(), 2);
        }

        it "anchors on the due date before the first generation" {
            let mut parent = template(user_id, RecurrenceKind::Daily, RecurrenceRule::default(), date(2024, 3, 1));
            parent.due_date = Some(date(2024, 3, 5));
            db.insert_task(&parent).expect("Failed to insert parent");

            let report = engine.run(date(2024, 3, 8)).expect("Run failed");
            assert_eq!(report.instances_created, 3);

            let instances = db.instances_of(parent.id).expect("Query failed");
            let due: Vec<_> = instances.iter().filter_map(|t| t.due_date).collect();
            assert_eq!(due, vec![date(2024, 3, 6), date(2024, 3, 7), date(2024, 3, 8)]);
        }

        it "anchors on the creation date when nothing else is set" {
            // Created on Monday 2024-01-01, recurring on Wednesdays: the
            // first instance falls on Jan 3, the second on Jan 10.
            let parent = template(user_id, RecurrenceKind::Weekly, weekly_rule(3), date(2024, 1, 1));
            db.insert_task(&parent).expect("Failed to insert parent");

            let report = engine.run(date(2024, 1, 10)).expect("Run failed");
            assert_eq!(report.instances_created, 2);

            let instances = db.instances_of(parent.id).expect("Query failed");
            let due: Vec<_> = instances.iter().filter_map(|t| t.due_date).collect();
            assert_eq!(due, vec![date(2024, 1, 3), date(2024, 1, 10)]);
        }

        it "advances the watermark even when nothing is due yet" {
            let parent = template(user_id, RecurrenceKind::Monthly, monthly_rule(15), date(2024, 3, 1));
            db.insert_task(&parent).expect("Failed to insert parent");

            let report = engine.run(date(2024, 3, 10)).expect("Run failed");
            assert_eq!(report.instances_created, 0);

            let parent = db.get_task(user_id, parent.id).expect("Query failed").expect("Parent missing");
            assert_eq!(parent.last_generated_at, Some(date(2024, 3, 10)));
        }

        it "skips completed parents" {
            let mut parent = template(user_id, RecurrenceKind::Daily, RecurrenceRule::default(), date(2024, 3, 1));
            parent.completed = true;
            db.insert_task(&parent).expect("Failed to insert parent");

            let report = engine.run(date(2024, 3, 10)).expect("Run failed");
            assert_eq!(report.eligible_parents, 0);
            assert!(db.instances_of(parent.id).expect("Query failed").is_empty());
        }

        it "never generates from instances" {
            let parent = template(user_id, RecurrenceKind::Daily, RecurrenceRule::default(), date(2024, 3, 1));
            db.insert_task(&parent).expect("Failed to insert parent");
            engine.run(date(2024, 3, 3)).expect("Run failed");

            let before = db.instances_of(parent.id).expect("Query failed").len();
            engine.run(date(2024, 3, 4)).expect("Run failed");
            let instances = db.instances_of(parent.id).expect("Query failed");

            // One more day, one more instance; none of the instances spawned
            // children of their own.
            assert_eq!(instances.len(), before + 1);
            for instance in &instances {
                assert!(db.instances_of(instance.id).expect("Query failed").is_empty());
            }
        }

        it "includes archived parents by default" {
            let mut parent = template(user_id, RecurrenceKind::Daily, RecurrenceRule::default(), date(2024, 3, 1));
            parent.is_archived = true;
            db.insert_task(&parent).expect("Failed to insert parent");

            let report = engine.run(date(2024, 3, 3)).expect("Run failed");
            assert_eq!(report.instances_created, 2);
        }

        it "excludes archived parents when configured" {
            let config = GenerationConfig {
                include_archived: false,
                ..Default::default()
            };
            let engine = RecurrenceEngine::new(db.clone(), config);

            let mut parent = template(user_id, RecurrenceKind::Daily, RecurrenceRule::default(), date(2024, 3, 1));
            parent.is_archived = true;
            db.insert_task(&parent).expect("Failed to insert parent");

            let report = engine.run(date(2024, 3, 3)).expect("Run failed");
            assert_eq!(report.eligible_parents, 0);
            assert!(db.instances_of(parent.id).expect("Query failed").is_empty());
        }

        it "copies content from the parent onto generated instances" {
            let mut parent = template(user_id, RecurrenceKind::Daily, RecurrenceRule::default(), date(2024, 3, 1));
            parent.text = "Standup notes".to_string();
            parent.description = "Post in the team channel".to_string();
            parent.priority = Priority::High;
            parent.tags = vec!["work".to_string(), "daily".to_string()];
            db.insert_task(&parent).expect("Failed to insert parent");

            engine.run(date(2024, 3, 2)).expect("Run failed");

            let instances = db.instances_of(parent.id).expect("Query failed");
            assert_eq!(instances.len(), 1);
            assert_eq!(instances[0].text, "Standup notes");
            assert_eq!(instances[0].description, "Post in the team channel");
            assert_eq!(instances[0].priority, Priority::High);
            assert_eq!(instances[0].tags, vec!["work".to_string(), "daily".to_string()]);
            assert_eq!(instances[0].user_id, user_id);
        }
    }
}

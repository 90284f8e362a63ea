use carbon_ledger::calc::StepId;
use carbon_ledger::db::Database;
use carbon_ledger::models::*;
use carbon_ledger::numeric::NumberInput;
use speculate2::speculate;
use uuid::Uuid;

fn create_test_project(db: &Database) -> Project {
    db.create_project(CreateProjectInput {
        name: "Test Project".to_string(),
        description: None,
    })
    .expect("Failed to create project")
}

fn values(pairs: &[(&str, &str)]) -> StepValues {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), NumberInput::from(*v)))
        .collect()
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "projects" {
        describe "create_project" {
            it "creates a project with required fields" {
                let project = db.create_project(CreateProjectInput {
                    name: "Palm Estate".to_string(),
                    description: None,
                }).expect("Failed to create project");

                assert_eq!(project.name, "Palm Estate");
                assert!(project.description.is_none());
            }

            it "creates a project with all fields" {
                let project = db.create_project(CreateProjectInput {
                    name: "Palm Estate".to_string(),
                    description: Some("North plantation, 2025 harvest".to_string()),
                }).expect("Failed to create project");

                assert_eq!(project.description, Some("North plantation, 2025 harvest".to_string()));
            }
        }

        describe "get_project" {
            it "returns None for non-existent project" {
                let result = db.get_project(Uuid::new_v4()).expect("Query failed");
                assert!(result.is_none());
            }

            it "returns the project by id" {
                let created = create_test_project(&db);

                let found = db.get_project(created.id).expect("Query failed");
                assert_eq!(found.expect("Project missing").name, "Test Project");
            }
        }

        describe "get_all_projects" {
            it "returns all projects ordered by name" {
                for name in ["Zebra", "Alpha"] {
                    db.create_project(CreateProjectInput {
                        name: name.to_string(),
                        description: None,
                    }).expect("Failed to create");
                }

                let projects = db.get_all_projects().expect("Query failed");
                assert_eq!(projects.len(), 2);
                assert_eq!(projects[0].name, "Alpha");
                assert_eq!(projects[1].name, "Zebra");
            }
        }

        describe "update_project" {
            it "keeps fields that are not provided" {
                let project = db.create_project(CreateProjectInput {
                    name: "Before".to_string(),
                    description: Some("kept".to_string()),
                }).expect("Failed to create");

                let updated = db.update_project(project.id, UpdateProjectInput {
                    name: Some("After".to_string()),
                    description: None,
                }).expect("Update failed").expect("Project missing");

                assert_eq!(updated.name, "After");
                assert_eq!(updated.description, Some("kept".to_string()));
                assert_eq!(updated.created_at, project.created_at);
            }

            it "returns None for non-existent project" {
                let result = db.update_project(Uuid::new_v4(), UpdateProjectInput::default())
                    .expect("Update failed");
                assert!(result.is_none());
            }
        }

        describe "delete_project" {
            it "deletes the project and its step records" {
                let project = create_test_project(&db);
                db.save_step_record(project.id, StepId::RawMaterials, &values(&[("cultivationArea", "10")]))
                    .expect("Failed to save step");

                assert!(db.delete_project(project.id).expect("Failed to delete"));

                let records = db.get_step_records(project.id).expect("Query failed");
                assert!(records.is_empty());
            }

            it "returns false for non-existent project" {
                assert!(!db.delete_project(Uuid::new_v4()).expect("Failed to delete"));
            }
        }
    }

    describe "step_records" {
        describe "save_step_record" {
            it "stores the flat value map" {
                let project = create_test_project(&db);
                let mut stored = values(&[("cornSeedsAmount", "20")]);
                stored.insert("co2eqEmissionsRawMaterialInputHaYr".to_string(), NumberInput::Number(50.0));

                let record = db.save_step_record(project.id, StepId::RawMaterials, &stored)
                    .expect("Failed to save step");

                assert_eq!(record.project_id, project.id);
                assert_eq!(record.step, StepId::RawMaterials);
                assert_eq!(record.values, stored);
            }

            it "replaces an existing record and keeps its creation time" {
                let project = create_test_project(&db);
                let first = db.save_step_record(project.id, StepId::Fertilizer, &values(&[("urea", "1")]))
                    .expect("Failed to save step");

                let second = db.save_step_record(project.id, StepId::Fertilizer, &values(&[("urea", "2")]))
                    .expect("Failed to save step");

                assert_eq!(second.created_at, first.created_at);
                assert_eq!(second.values["urea"], NumberInput::from("2"));
                assert_eq!(db.get_step_records(project.id).expect("Query failed").len(), 1);
            }

            it "fails for non-existent project" {
                let result = db.save_step_record(Uuid::new_v4(), StepId::Audit, &StepValues::new());
                assert!(result.is_err());
            }
        }

        describe "get_step_records" {
            it "returns records in form order" {
                let project = create_test_project(&db);
                for step in [StepId::Audit, StepId::RawMaterials, StepId::Processing] {
                    db.save_step_record(project.id, step, &StepValues::new())
                        .expect("Failed to save step");
                }

                let steps: Vec<StepId> = db.get_step_records(project.id)
                    .expect("Query failed")
                    .into_iter()
                    .map(|r| r.step)
                    .collect();

                assert_eq!(steps, vec![StepId::RawMaterials, StepId::Processing, StepId::Audit]);
            }

            it "keeps projects separate" {
                let a = create_test_project(&db);
                let b = create_test_project(&db);
                db.save_step_record(a.id, StepId::RawMaterials, &StepValues::new())
                    .expect("Failed to save step");

                assert!(db.get_step_records(b.id).expect("Query failed").is_empty());
            }
        }

        describe "bulk_save_step_records" {
            it "saves every entry" {
                let project = create_test_project(&db);
                let entries = vec![
                    (StepId::RawMaterials, values(&[("cultivationArea", "10")])),
                    (StepId::Fertilizer, values(&[("urea", "5")])),
                ];

                let records = db.bulk_save_step_records(project.id, &entries)
                    .expect("Failed to bulk save");

                assert_eq!(records.len(), 2);
                let with_steps = db.get_project_with_steps(project.id)
                    .expect("Query failed")
                    .expect("Project missing");
                assert_eq!(with_steps.completed_steps, vec![StepId::RawMaterials, StepId::Fertilizer]);
            }
        }

        describe "rewrite_step_records" {
            it "hands the current records to the rewrite and stores its entries" {
                let project = create_test_project(&db);
                db.save_step_record(project.id, StepId::RawMaterials, &values(&[("cultivationArea", "10")]))
                    .expect("Failed to save step");

                let records = db.rewrite_step_records(project.id, None, |current| {
                    assert_eq!(current.len(), 1);
                    assert_eq!(current[0].values["cultivationArea"], NumberInput::from("10"));
                    vec![(StepId::Fertilizer, values(&[("urea", "5")]))]
                }).expect("Rewrite failed");

                assert_eq!(records.len(), 1);
                assert_eq!(records[0].step, StepId::Fertilizer);
                assert_eq!(db.get_step_records(project.id).expect("Query failed").len(), 2);
            }

            it "removes the given step before the rewrite sees the records" {
                let project = create_test_project(&db);
                db.save_step_record(project.id, StepId::Processing, &StepValues::new())
                    .expect("Failed to save step");

                db.rewrite_step_records(project.id, Some(StepId::Processing), |current| {
                    assert!(current.is_empty());
                    Vec::new()
                }).expect("Rewrite failed");

                assert!(db.get_step_record(project.id, StepId::Processing).expect("Query failed").is_none());
            }

            it "fails when the step to remove has no record" {
                let project = create_test_project(&db);

                let result = db.rewrite_step_records(project.id, Some(StepId::Audit), |_| Vec::new());

                let message = result.expect_err("Expected an error").to_string();
                assert!(message.contains("not found"), "{}", message);
            }

            it "fails for non-existent project" {
                let result = db.rewrite_step_records(Uuid::new_v4(), None, |_| Vec::new());
                assert!(result.is_err());
            }

            it "keeps every writer's latest input when saves overlap" {
                let project = create_test_project(&db);
                let rounds = 25;

                let writers: Vec<_> = StepId::ALL
                    .into_iter()
                    .map(|own| {
                        let db = db.clone();
                        let project_id = project.id;
                        std::thread::spawn(move || {
                            for round in 0..rounds {
                                let text = round.to_string();
                                // like a cascade: re-write every stored step plus our own edit
                                db.rewrite_step_records(project_id, None, |current| {
                                    let mut entries: Vec<(StepId, StepValues)> = current
                                        .iter()
                                        .filter(|record| record.step != own)
                                        .map(|record| (record.step, record.values.clone()))
                                        .collect();
                                    entries.push((own, values(&[("input", text.as_str())])));
                                    entries
                                }).expect("Rewrite failed");
                            }
                        })
                    })
                    .collect();

                for writer in writers {
                    writer.join().expect("Writer panicked");
                }

                let last = (rounds - 1).to_string();
                let records = db.get_step_records(project.id).expect("Query failed");
                assert_eq!(records.len(), 6);
                for record in records {
                    assert_eq!(record.values["input"], NumberInput::from(last.as_str()), "step {}", record.step);
                }
            }
        }

        describe "delete_step_record" {
            it "removes only the given step" {
                let project = create_test_project(&db);
                db.save_step_record(project.id, StepId::RawMaterials, &StepValues::new())
                    .expect("Failed to save step");
                db.save_step_record(project.id, StepId::Fertilizer, &StepValues::new())
                    .expect("Failed to save step");

                assert!(db.delete_step_record(project.id, StepId::RawMaterials).expect("Delete failed"));
                assert!(!db.delete_step_record(project.id, StepId::RawMaterials).expect("Delete failed"));

                let remaining = db.get_step_record(project.id, StepId::Fertilizer).expect("Query failed");
                assert!(remaining.is_some());
                assert!(db.get_step_record(project.id, StepId::RawMaterials).expect("Query failed").is_none());
            }
        }
    }

    describe "file database" {
        it "persists across reopen" {
            let dir = tempfile::tempdir().expect("Failed to create temp dir");
            let path = dir.path().join("nested").join("ledger.db");

            let project_id = {
                let file_db = Database::open(path.clone()).expect("Failed to open");
                file_db.migrate().expect("Failed to migrate");
                let project = create_test_project(&file_db);
                file_db.save_step_record(project.id, StepId::Allocation, &values(&[("palmKernelOutput", "3")]))
                    .expect("Failed to save step");
                project.id
            };

            let reopened = Database::open(path).expect("Failed to reopen");
            reopened.migrate().expect("Failed to migrate");
            let record = reopened.get_step_record(project_id, StepId::Allocation)
                .expect("Query failed")
                .expect("Record missing");
            assert_eq!(record.values["palmKernelOutput"], NumberInput::from("3"));
        }
    }
}

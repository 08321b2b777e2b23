use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rteams::checks::record_issues;
use rteams::encoder::{OptimizationModel, encode};
use rteams::loaders::{Dataset, Loader, Table};
use rteams::publisher::ResultStore;
use rteams::solver::{BranchAndBound, CancelToken, Solution, Solver, TerminalStatus};
use rteams::{Config, JobState, Orchestrator};
use std::time::Duration;

const CONFIG: &str = r#"{
    "student_mapping": {"1": 1, "2": 2, "3": 3, "4": 4, "5": 5},
    "company_mapping": {"1": 10, "2": 20},
    "skill_importance": {"Python": "1/2"},
    "time_avaliability": ["Mon"],
    "group_size": {"min": 3, "max": 3}
}"#;

const STUDENTS: &str = "\
EID,Name,Mon,Python,SQL
s1,Ada,1,3,3
s2,Bob,1,3,3
s3,Cyd,1,3,3
s4,Dee,1,3,3
s5,Eve,1,3,3
s6,Fay,1,3,3
";

const PROJECTS: &str = "\
Project_ID,Company,Project_Title,Python,SQL
p1,Acme,Rockets,1,2
p2,Beta,Boats,2,1
";

fn table(content: &str) -> Table {
    Table::from_reader(content.as_bytes()).unwrap()
}

#[tokio::test]
async fn end_to_end_uniform_partition() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Student.csv"), STUDENTS).unwrap();
    std::fs::write(dir.path().join("Company.csv"), PROJECTS).unwrap();
    let config = Config::from_json(CONFIG).unwrap();
    let bounds = config.group_size;
    let orchestrator = Orchestrator::new(
        config,
        Loader::new(dir.path().join("Student.csv"), dir.path().join("Company.csv")),
        ResultStore::new(dir.path().join("out.json")),
    );
    let job = orchestrator.submit().await.unwrap();
    let state = tokio::time::timeout(Duration::from_secs(30), job.finished())
        .await
        .unwrap();
    assert_eq!(state, JobState::Completed);

    // Requirements scale to 10/40 and 20/20 with a global factor of 40, so
    // multipliers are 4/1 and 2/2. Three students rated 3 give goodness
    // min(36, 9) = 9 and min(18, 18) = 18.
    let result = orchestrator.get_result().await.unwrap();
    assert_eq!(result.objective, Some(9));
    assert!(record_issues(&result, bounds).is_empty());
    assert!(result.matching.values().all(|members| members.len() == 3));
    assert!(result.time_slot.values().all(|slot| slot == "Mon"));

    let persisted: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("out.json")).unwrap()).unwrap();
    assert_eq!(persisted["objective"], 9);
    assert_eq!(persisted["skills"]["0"], "Python");
}

#[test]
fn scaled_model_is_exact() {
    let config = Config::from_json(CONFIG).unwrap();
    let data = Dataset::from_tables(&table(STUDENTS), &table(PROJECTS), &config).unwrap();
    let model = encode(&data, &config).unwrap();
    assert_eq!(model.scale_factor, 2);
    assert_eq!(model.global_factor, 40);
    assert_eq!(model.requirements[(0, 0)], 10);
    assert_eq!(model.requirements[(0, 1)], 40);
    assert_eq!(model.multipliers[(1, 0)], 2);
}

#[test]
fn verifier_reports_every_issue() {
    let config = Config::from_json(CONFIG).unwrap();
    let students = STUDENTS.replace("EID,", "Student,");
    let projects = format!("{PROJECTS},Delta,Cars,1,1\n");
    let err = Dataset::from_tables(&table(&students), &table(&projects), &config).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Missing required column: EID"), "{message}");
    assert!(message.contains("Project_ID cannot be empty at row 2"), "{message}");
}

fn random_instance(rng: &mut StdRng) -> Option<OptimizationModel> {
    let min = rng.random_range(1..=2);
    let max = rng.random_range(min..=3);
    let teams = 2;
    let students = rng.random_range((teams * min).max(2)..=(teams * max).min(7));
    let config = Config::from_json(&format!(
        r#"{{
            "student_mapping": {{"1": 1, "2": 2, "3": 3}},
            "company_mapping": {{"1": 1, "2": 2, "3": 3}},
            "skill_importance": {{"B": "2/3"}},
            "time_availability": ["Mon", "Tue"],
            "group_size": {{"min": {min}, "max": {max}}}
        }}"#
    ))
    .unwrap();
    let mut student_csv = "EID,Name,Mon,Tue,A,B\n".to_owned();
    for i in 0..students {
        let (mon, tue) = match rng.random_range(0..3) {
            0 => (1, 0),
            1 => (0, 1),
            _ => (1, 1),
        };
        student_csv += &format!(
            "s{i},S{i},{mon},{tue},{},{}\n",
            rng.random_range(1..=3),
            rng.random_range(1..=3)
        );
    }
    let mut project_csv = "Project_ID,Company,Project_Title,A,B\n".to_owned();
    for t in 0..teams {
        project_csv += &format!(
            "p{t},C,T,{},{}\n",
            rng.random_range(1..=3),
            rng.random_range(1..=3)
        );
    }
    let data = Dataset::from_tables(&table(&student_csv), &table(&project_csv), &config).ok()?;
    encode(&data, &config).ok()
}

/// Best objective over every assignment and slot choice.
fn brute_force(model: &OptimizationModel) -> Option<i64> {
    let (n, teams, slots) = (model.students(), model.teams(), model.slot_count());
    let mut best = None;
    for code in 0..teams.pow(n as u32) {
        let team_of = (0..n)
            .map(|i| code / teams.pow(i as u32) % teams)
            .collect::<Vec<_>>();
        for slot_code in 0..slots.pow(teams as u32) {
            let slot_of = (0..teams)
                .map(|t| slot_code / slots.pow(t as u32) % slots)
                .collect::<Vec<_>>();
            let solution = Solution::from_indices(&team_of, &slot_of, teams, slots, 0);
            if let Ok(objective) = model.evaluate(&solution) {
                best = best.max(Some(objective));
            }
        }
    }
    best
}

#[test]
fn branch_and_bound_matches_exhaustive_search() {
    let mut rng = StdRng::seed_from_u64(0x7ea5);
    let mut checked = 0;
    while checked < 40 {
        let Some(model) = random_instance(&mut rng) else {
            continue;
        };
        checked += 1;
        let mut found = Vec::new();
        let status = BranchAndBound.solve(&model, &mut |s| found.push(s), &CancelToken::new());
        for solution in &found {
            assert_eq!(model.evaluate(solution), Ok(solution.objective));
        }
        assert!(found.windows(2).all(|w| w[0].objective < w[1].objective));
        match brute_force(&model) {
            Some(best) => {
                assert_eq!(status, TerminalStatus::Optimal);
                assert_eq!(found.last().map(|s| s.objective), Some(best));
            }
            None => {
                assert_eq!(status, TerminalStatus::Infeasible);
                assert!(found.is_empty());
            }
        }
    }
}

use crate::encoder::OptimizationModel;
use crate::publisher::SolveResult;
use crate::solver::Solution;
use crate::stats;

pub fn display_details(result: &SolveResult) {
    let mut teams = result.matching.iter().collect::<Vec<_>>();
    teams.sort_by_key(|&(&t, _)| result.team_name(t));
    for (&team, members) in teams {
        let mut names = members
            .iter()
            .map(|&s| result.student_name(s))
            .collect::<Vec<_>>();
        names.sort();
        match result.time_slot.get(&team) {
            Some(slot) => println!("{} ({slot}):", result.team_name(team)),
            None => println!("{}:", result.team_name(team)),
        }
        for name in names {
            println!("  - {name}");
        }
        println!();
    }
}

pub fn display_stats(model: &OptimizationModel, solution: &Solution) {
    let goodness = stats::statistics(model, solution);
    println!(
        "Students/teams/skills: {}/{}/{}",
        model.students(),
        model.teams(),
        model.skills.len()
    );
    println!("Objective: {}", solution.objective);
    println!("Team goodness:");
    for (team, g) in goodness.iter().enumerate() {
        print!("  - team {}: {g}", team + 1);
        if let Some(k) = stats::weakest_skill(model, solution, team) {
            print!(" (limited by {})", model.skills[k]);
        }
        println!();
    }
}

use crate::encoder::OptimizationModel;
use crate::solver::Solution;

/// Goodness of every team, in team order.
pub fn statistics(model: &OptimizationModel, solution: &Solution) -> Vec<i64> {
    (0..model.teams())
        .map(|t| model.team_goodness(t, &solution.members(t)))
        .collect()
}

/// Index of the skill limiting the goodness of `team`, if any.
pub fn weakest_skill(model: &OptimizationModel, solution: &Solution, team: usize) -> Option<usize> {
    let members = solution.members(team);
    (0..model.skills.len()).min_by_key(|&k| {
        members
            .iter()
            .map(|&i| model.contribution(i, team, k))
            .sum::<i64>()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::tests::model_from;

    #[test]
    fn test_statistics() {
        let config = r#"{
            "student_mapping": {"1": 1, "2": 2, "3": 3},
            "company_mapping": {"1": 1},
            "time_availability": ["Mon"],
            "group_size": {"min": 1, "max": 2}
        }"#;
        let students = "EID,Name,Mon,Python,SQL\na,A,1,3,1\nb,B,1,1,2\nc,C,1,2,2\n";
        let projects = "Project_ID,Company,Project_Title,Python,SQL\np1,X,Y,1,1\np2,X,Z,1,1\n";
        let model = model_from(config, students, projects);
        let solution = Solution::from_indices(&[0, 0, 1], &[0, 0], 2, 1, 2);
        assert_eq!(statistics(&model, &solution), vec![3, 2]);
        assert_eq!(weakest_skill(&model, &solution, 0), Some(1));
    }
}

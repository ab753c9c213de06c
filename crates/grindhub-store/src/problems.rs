use rusqlite::params;
use uuid::Uuid;

use grindhub_shared::UserId;

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{NewProblem, Problem, ProblemFilter, ProblemSort};
use crate::row;

const PROBLEM_COLUMNS: &str = "id, title, description, difficulty, category, tags, companies,
     examples, constraints, hints, solution, created_by, likes, submissions,
     created_at, updated_at";

impl Database {
    pub fn create_problem(&self, creator: &UserId, new: NewProblem) -> Result<Problem> {
        validate(&new)?;
        let id = Uuid::new_v4();
        let now = row::now();

        self.conn().execute(
            "INSERT INTO problems (id, title, description, difficulty, category, tags, companies,
                                   examples, constraints, hints, solution, created_by,
                                   likes, submissions, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0, 0, ?13, ?13)",
            params![
                id.to_string(),
                new.title,
                new.description,
                new.difficulty.as_str(),
                new.category.as_str(),
                serde_json::to_string(&new.tags)?,
                serde_json::to_string(&new.companies)?,
                serde_json::to_string(&new.examples)?,
                serde_json::to_string(&new.constraints)?,
                serde_json::to_string(&new.hints)?,
                new.solution.as_ref().map(serde_json::to_string).transpose()?,
                creator.as_str(),
                now,
            ],
        )?;

        self.get_problem(id)
    }

    pub fn get_problem(&self, id: Uuid) -> Result<Problem> {
        self.conn()
            .query_row(
                &format!("SELECT {PROBLEM_COLUMNS} FROM problems WHERE id = ?1"),
                params![id.to_string()],
                row_to_problem,
            )
            .map_err(not_found)
    }

    /// List problems matching the filter. Defaults to newest first.
    pub fn list_problems(&self, filter: &ProblemFilter) -> Result<Vec<Problem>> {
        let order = match filter.sort_by.unwrap_or(ProblemSort::Newest) {
            ProblemSort::Newest => "created_at DESC",
            ProblemSort::Oldest => "created_at ASC",
            ProblemSort::Popular => "likes DESC, submissions DESC",
            ProblemSort::Difficulty => {
                "CASE difficulty WHEN 'easy' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END ASC,
                 created_at DESC"
            }
        };
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {PROBLEM_COLUMNS} FROM problems
             WHERE (?1 IS NULL OR difficulty = ?1)
               AND (?2 IS NULL OR category = ?2)
               AND (?3 IS NULL
                    OR title LIKE '%' || ?3 || '%'
                    OR description LIKE '%' || ?3 || '%'
                    OR EXISTS (SELECT 1 FROM json_each(problems.tags) WHERE value = ?3))
             ORDER BY {order}"
        ))?;

        let rows = stmt.query_map(
            params![
                filter.difficulty.map(|d| d.as_str()),
                filter.category.map(|c| c.as_str()),
                search,
            ],
            row_to_problem,
        )?;

        let mut problems = Vec::new();
        for row in rows {
            problems.push(row?);
        }
        Ok(problems)
    }

    /// Replace the editable fields of a problem. Creator only.
    pub fn update_problem(&self, id: Uuid, actor: &UserId, update: NewProblem) -> Result<Problem> {
        self.ensure_problem_creator(id, actor)?;
        validate(&update)?;

        self.conn().execute(
            "UPDATE problems
             SET title = ?2, description = ?3, difficulty = ?4, category = ?5, tags = ?6,
                 companies = ?7, examples = ?8, constraints = ?9, hints = ?10,
                 solution = ?11, updated_at = ?12
             WHERE id = ?1",
            params![
                id.to_string(),
                update.title,
                update.description,
                update.difficulty.as_str(),
                update.category.as_str(),
                serde_json::to_string(&update.tags)?,
                serde_json::to_string(&update.companies)?,
                serde_json::to_string(&update.examples)?,
                serde_json::to_string(&update.constraints)?,
                serde_json::to_string(&update.hints)?,
                update.solution.as_ref().map(serde_json::to_string).transpose()?,
                row::now(),
            ],
        )?;
        self.get_problem(id)
    }

    pub fn delete_problem(&self, id: Uuid, actor: &UserId) -> Result<()> {
        self.ensure_problem_creator(id, actor)?;
        self.conn()
            .execute("DELETE FROM problems WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    pub fn like_problem(&self, id: Uuid) -> Result<Problem> {
        let affected = self.conn().execute(
            "UPDATE problems SET likes = likes + 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_problem(id)
    }

    fn ensure_problem_creator(&self, id: Uuid, actor: &UserId) -> Result<()> {
        let problem = self.get_problem(id)?;
        if problem.created_by.as_ref() != Some(actor) {
            return Err(StoreError::Forbidden("Only the creator can modify a problem".into()));
        }
        Ok(())
    }
}

fn validate(problem: &NewProblem) -> Result<()> {
    if problem.title.trim().is_empty() || problem.description.trim().is_empty() {
        return Err(StoreError::Invalid("title and description are required".into()));
    }
    Ok(())
}

fn row_to_problem(r: &rusqlite::Row<'_>) -> rusqlite::Result<Problem> {
    let id: String = r.get(0)?;
    let difficulty: String = r.get(3)?;
    let category: String = r.get(4)?;
    let tags: String = r.get(5)?;
    let companies: String = r.get(6)?;
    let examples: String = r.get(7)?;
    let constraints: String = r.get(8)?;
    let hints: String = r.get(9)?;
    let solution: Option<String> = r.get(10)?;
    let created: String = r.get(14)?;
    let updated: String = r.get(15)?;

    Ok(Problem {
        id: row::uuid(0, &id)?,
        title: r.get(1)?,
        description: r.get(2)?,
        difficulty: row::parsed(3, &difficulty)?,
        category: row::parsed(4, &category)?,
        tags: row::json_list(5, &tags)?,
        companies: row::json_list(6, &companies)?,
        examples: row::json(7, &examples)?,
        constraints: row::json_list(8, &constraints)?,
        hints: row::json_list(9, &hints)?,
        solution: solution.map(|s| row::json(10, &s)).transpose()?,
        created_by: r.get::<_, Option<String>>(11)?.map(UserId),
        likes: r.get(12)?,
        submissions: r.get(13)?,
        created_at: row::timestamp(14, &created)?,
        updated_at: row::timestamp(15, &updated)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Example, ProblemCategory, ProblemDifficulty, Solution};

    fn problem(title: &str, difficulty: ProblemDifficulty, tags: &[&str]) -> NewProblem {
        NewProblem {
            title: title.into(),
            description: format!("Solve {title}"),
            difficulty,
            category: ProblemCategory::Algorithms,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            companies: vec!["Acme".into()],
            examples: vec![Example {
                input: "[1,2]".into(),
                output: "3".into(),
                explanation: None,
            }],
            constraints: vec![],
            hints: vec![],
            solution: Some(Solution {
                approach: Some("hash map".into()),
                code: None,
                time_complexity: Some("O(n)".into()),
                space_complexity: Some("O(n)".into()),
            }),
        }
    }

    #[test]
    fn create_and_fetch_keeps_structured_fields() {
        let db = Database::open_in_memory().unwrap();
        let created = db
            .create_problem(&"u1".into(), problem("Two Sum", ProblemDifficulty::Easy, &["array"]))
            .unwrap();

        let fetched = db.get_problem(created.id).unwrap();
        assert_eq!(fetched.examples.len(), 1);
        assert_eq!(fetched.solution, created.solution);
        assert_eq!(fetched.created_by, Some(UserId::new("u1")));
        assert_eq!(fetched.likes, 0);
    }

    #[test]
    fn popular_and_difficulty_ordering() {
        let db = Database::open_in_memory().unwrap();
        let u = UserId::new("u1");
        let hard = db
            .create_problem(&u, problem("Median", ProblemDifficulty::Hard, &[]))
            .unwrap();
        let easy = db
            .create_problem(&u, problem("Two Sum", ProblemDifficulty::Easy, &[]))
            .unwrap();
        db.like_problem(hard.id).unwrap();

        let popular = db
            .list_problems(&ProblemFilter {
                sort_by: Some(ProblemSort::Popular),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(popular[0].id, hard.id);

        let by_difficulty = db
            .list_problems(&ProblemFilter {
                sort_by: Some(ProblemSort::Difficulty),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_difficulty[0].id, easy.id);
    }

    #[test]
    fn search_matches_title_or_exact_tag() {
        let db = Database::open_in_memory().unwrap();
        let u = UserId::new("u1");
        db.create_problem(&u, problem("Two Sum", ProblemDifficulty::Easy, &["hash-table"]))
            .unwrap();
        db.create_problem(&u, problem("LRU Cache", ProblemDifficulty::Medium, &["design"]))
            .unwrap();

        let found = db
            .list_problems(&ProblemFilter {
                search: Some("two".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(found.len(), 1);

        let tagged = db
            .list_problems(&ProblemFilter {
                search: Some("design".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].title, "LRU Cache");
    }

    #[test]
    fn only_creator_modifies() {
        let db = Database::open_in_memory().unwrap();
        let created = db
            .create_problem(&"u1".into(), problem("Two Sum", ProblemDifficulty::Easy, &[]))
            .unwrap();

        let denied = db.update_problem(
            created.id,
            &"u2".into(),
            problem("Three Sum", ProblemDifficulty::Medium, &[]),
        );
        assert!(matches!(denied, Err(StoreError::Forbidden(_))));
        assert!(matches!(
            db.delete_problem(created.id, &"u2".into()),
            Err(StoreError::Forbidden(_))
        ));

        db.delete_problem(created.id, &"u1".into()).unwrap();
        assert!(matches!(db.like_problem(created.id), Err(StoreError::NotFound)));
    }
}

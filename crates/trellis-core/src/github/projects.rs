//! Project boards through the GraphQL API (Projects v2). A board's columns
//! are the options of its single-select `Status` field, and a card's column
//! is the option its item has selected.

use super::{or_not_found, GitHubClient};
use crate::error::{Result, TrellisError};
use crate::tracker::{NewProject, Project, ProjectCard, ProjectOwner};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

/// Single-select field whose options are the board's columns.
pub const COLUMN_FIELD: &str = "Status";

const PROJECT_FIELDS: &str = r#"
    id number title shortDescription url
    field(name: $field) {
        ... on ProjectV2SingleSelectField { id options { id name } }
    }
"#;

const VIEWER_QUERY: &str = "query { viewer { id } }";

const ORGANIZATION_QUERY: &str = "query($login: String!) { organization(login: $login) { id } }";

const REPOSITORY_QUERY: &str =
    "query($owner: String!, $name: String!) { repository(owner: $owner, name: $name) { id owner { id } } }";

const ISSUE_QUERY: &str = r#"
    query($owner: String!, $name: String!, $number: Int!) {
        repository(owner: $owner, name: $name) { issue(number: $number) { id title } }
    }
"#;

const ADD_ITEM: &str = r#"
    mutation($input: AddProjectV2ItemByIdInput!) {
        addProjectV2ItemById(input: $input) { item { id } }
    }
"#;

const SET_ITEM_COLUMN: &str = r#"
    mutation($input: UpdateProjectV2ItemFieldValueInput!) {
        updateProjectV2ItemFieldValue(input: $input) { projectV2Item { id } }
    }
"#;

const SET_COLUMNS: &str = r#"
    mutation($input: UpdateProjectV2FieldInput!) {
        updateProjectV2Field(input: $input) {
            projectV2Field { ... on ProjectV2SingleSelectField { id options { id name } } }
        }
    }
"#;

const SET_DESCRIPTION: &str = r#"
    mutation($input: UpdateProjectV2Input!) {
        updateProjectV2(input: $input) { projectV2 { id } }
    }
"#;

fn create_mutation() -> String {
    format!(
        "mutation($input: CreateProjectV2Input!, $field: String!) {{ \
         createProjectV2(input: $input) {{ projectV2 {{ {PROJECT_FIELDS} }} }} }}"
    )
}

// TODO: page through items past the first 100 once boards grow that large.
fn project_query() -> String {
    format!(
        "query($id: ID!, $field: String!) {{ node(id: $id) {{ ... on ProjectV2 {{ {PROJECT_FIELDS} \
         items(first: 100) {{ nodes {{ id \
         fieldValueByName(name: $field) {{ ... on ProjectV2ItemFieldSingleSelectValue {{ name }} }} \
         content {{ ... on Issue {{ number title }} ... on DraftIssue {{ title }} }} }} }} }} }} }}"
    )
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct Reply {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<ReplyError>,
}

#[derive(Deserialize)]
struct ReplyError {
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct Node {
    id: String,
}

#[derive(Deserialize)]
struct WireOption {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct WireField {
    id: String,
    #[serde(default)]
    options: Vec<WireOption>,
}

#[derive(Deserialize, Default)]
struct WireItems {
    #[serde(default)]
    nodes: Vec<WireItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireItem {
    id: String,
    #[serde(default)]
    field_value_by_name: Option<WireFieldValue>,
    #[serde(default)]
    content: Option<WireContent>,
}

#[derive(Deserialize)]
struct WireFieldValue {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct WireContent {
    #[serde(default)]
    number: Option<u64>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireProject {
    id: String,
    number: u64,
    title: String,
    #[serde(default)]
    short_description: Option<String>,
    #[serde(default)]
    url: String,
    /// Absent (or an empty object) when the board has no single-select
    /// column field.
    #[serde(default, deserialize_with = "lenient_field")]
    field: Option<WireField>,
    #[serde(default)]
    items: WireItems,
}

/// A field that exists but is not single-select comes back as `{}`.
fn lenient_field<'de, D>(d: D) -> std::result::Result<Option<WireField>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(d)?;
    Ok(raw.and_then(|v| serde_json::from_value(v).ok()))
}

impl From<WireProject> for Project {
    fn from(w: WireProject) -> Self {
        Project {
            id: w.id,
            number: w.number,
            title: w.title,
            description: w.short_description.unwrap_or_default(),
            url: w.url,
            columns: w
                .field
                .map(|f| f.options.into_iter().map(|o| o.name).collect())
                .unwrap_or_default(),
            cards: w
                .items
                .nodes
                .into_iter()
                .map(|item| {
                    let (issue, title) = item
                        .content
                        .map(|c| (c.number, c.title.unwrap_or_default()))
                        .unwrap_or_default();
                    ProjectCard {
                        id: item.id,
                        column: item.field_value_by_name.and_then(|v| v.name),
                        issue,
                        title,
                    }
                })
                .collect(),
        }
    }
}

fn unexpected(e: impl std::fmt::Display) -> TrellisError {
    TrellisError::Remote {
        status: 502,
        message: format!("unexpected GraphQL response: {e}"),
    }
}

// ---------------------------------------------------------------------------
// GitHubClient
// ---------------------------------------------------------------------------

impl GitHubClient {
    /// POST a GraphQL document. Errors typed `NOT_FOUND` surface as a 404 so
    /// callers can map them like REST misses.
    fn graphql<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        let body = json!({ "query": query, "variables": variables });
        let url = format!("{}/graphql", self.base_url);
        let reply: Reply = Self::json(self.send(self.http.post(url).json(&body))?)?;
        if let Some(first) = reply.errors.into_iter().next() {
            let status = if first.kind.as_deref() == Some("NOT_FOUND") {
                404
            } else {
                422
            };
            return Err(TrellisError::Remote {
                status,
                message: first.message,
            });
        }
        let data = reply
            .data
            .filter(|d| !d.is_null())
            .ok_or_else(|| unexpected("no data"))?;
        serde_json::from_value(data).map_err(unexpected)
    }

    /// Node id of the board's owner, plus the repository to link when the
    /// board belongs to the tracker's repository.
    fn project_owner(&self, owner: &ProjectOwner) -> Result<(String, Option<String>)> {
        match owner {
            ProjectOwner::Viewer => {
                #[derive(Deserialize)]
                struct Data {
                    viewer: Node,
                }
                let data: Data = self.graphql(VIEWER_QUERY, json!({}))?;
                Ok((data.viewer.id, None))
            }
            ProjectOwner::Organization(login) => {
                #[derive(Deserialize)]
                struct Data {
                    organization: Option<Node>,
                }
                let data: Data = self.graphql(ORGANIZATION_QUERY, json!({ "login": login }))?;
                let org = data.organization.ok_or_else(|| TrellisError::Remote {
                    status: 404,
                    message: format!("organization not found: {login}"),
                })?;
                Ok((org.id, None))
            }
            ProjectOwner::Repository => {
                #[derive(Deserialize)]
                struct Repo {
                    id: String,
                    owner: Node,
                }
                #[derive(Deserialize)]
                struct Data {
                    repository: Option<Repo>,
                }
                let vars = json!({ "owner": self.repo.owner, "name": self.repo.name });
                let data: Data = self.graphql(REPOSITORY_QUERY, vars)?;
                let repo = data.repository.ok_or_else(|| TrellisError::Remote {
                    status: 404,
                    message: format!("repository not found: {}", self.repo),
                })?;
                Ok((repo.owner.id, Some(repo.id)))
            }
        }
    }

    pub(super) fn create_project_v2(&self, new: &NewProject) -> Result<Project> {
        if new.columns.is_empty() {
            return Err(TrellisError::NoColumns(new.title.clone()));
        }
        let (owner_id, repository_id) = self.project_owner(&new.owner)?;
        tracing::debug!(title = %new.title, owner = ?new.owner, "createProjectV2");

        let mut input = json!({ "ownerId": owner_id, "title": new.title });
        if let Some(repository_id) = repository_id {
            input["repositoryId"] = Value::String(repository_id);
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Created {
            project_v2: WireProject,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            create_project_v2: Created,
        }
        let data: Data = self.graphql(
            &create_mutation(),
            json!({ "input": input, "field": COLUMN_FIELD }),
        )?;
        let mut wire = data.create_project_v2.project_v2;

        if !new.description.is_empty() {
            tracing::debug!(project = %wire.id, "updateProjectV2");
            let input = json!({ "projectId": wire.id, "shortDescription": new.description });
            let _: Value = self.graphql(SET_DESCRIPTION, json!({ "input": input }))?;
            wire.short_description = Some(new.description.clone());
        }

        let field_id = wire
            .field
            .as_ref()
            .map(|f| f.id.clone())
            .ok_or_else(|| TrellisError::NoColumns(wire.id.clone()))?;
        let options: Vec<Value> = new
            .columns
            .iter()
            .map(|name| json!({ "name": name, "color": "GRAY", "description": "" }))
            .collect();
        tracing::debug!(project = %wire.id, columns = new.columns.len(), "updateProjectV2Field");
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Updated {
            project_v2_field: WireField,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct FieldData {
            update_project_v2_field: Updated,
        }
        let input = json!({ "fieldId": field_id, "singleSelectOptions": options });
        let data: FieldData = self.graphql(SET_COLUMNS, json!({ "input": input }))?;
        wire.field = Some(data.update_project_v2_field.project_v2_field);
        Ok(wire.into())
    }

    fn fetch_project(&self, id: &str) -> Result<WireProject> {
        #[derive(Deserialize)]
        struct Data {
            node: Option<Value>,
        }
        tracing::debug!(project = id, "GET project");
        let data: Data = self
            .graphql(&project_query(), json!({ "id": id, "field": COLUMN_FIELD }))
            .map_err(|e| or_not_found(e, TrellisError::ProjectNotFound(id.to_string())))?;
        // Any other node type matches no fragment and comes back as `{}`.
        let node = data
            .node
            .filter(|n| n.get("id").is_some())
            .ok_or_else(|| TrellisError::ProjectNotFound(id.to_string()))?;
        serde_json::from_value(node).map_err(unexpected)
    }

    pub(super) fn project_v2(&self, id: &str) -> Result<Project> {
        Ok(self.fetch_project(id)?.into())
    }

    pub(super) fn add_project_v2_item(
        &self,
        project_id: &str,
        issue_number: u64,
        column: &str,
    ) -> Result<ProjectCard> {
        let project = self.fetch_project(project_id)?;
        let field = project
            .field
            .as_ref()
            .ok_or_else(|| TrellisError::NoColumns(project_id.to_string()))?;
        let option = field
            .options
            .iter()
            .find(|o| o.name == column)
            .ok_or_else(|| TrellisError::ColumnNotFound {
                project: project_id.to_string(),
                column: column.to_string(),
            })?;

        #[derive(Deserialize)]
        struct IssueNode {
            id: String,
            title: String,
        }
        #[derive(Deserialize)]
        struct Repo {
            issue: Option<IssueNode>,
        }
        #[derive(Deserialize)]
        struct IssueData {
            repository: Option<Repo>,
        }
        let vars = json!({
            "owner": self.repo.owner,
            "name": self.repo.name,
            "number": issue_number,
        });
        let data: IssueData = self
            .graphql(ISSUE_QUERY, vars)
            .map_err(|e| or_not_found(e, TrellisError::IssueNotFound(issue_number)))?;
        let issue = data
            .repository
            .and_then(|r| r.issue)
            .ok_or(TrellisError::IssueNotFound(issue_number))?;

        tracing::debug!(project = project_id, issue = issue_number, column, "addProjectV2ItemById");
        #[derive(Deserialize)]
        struct Item {
            item: Node,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct AddData {
            add_project_v2_item_by_id: Item,
        }
        let input = json!({ "projectId": project_id, "contentId": issue.id });
        let added: AddData = self.graphql(ADD_ITEM, json!({ "input": input }))?;
        let item_id = added.add_project_v2_item_by_id.item.id;

        let input = json!({
            "projectId": project_id,
            "itemId": item_id,
            "fieldId": field.id,
            "value": { "singleSelectOptionId": option.id },
        });
        let _: Value = self.graphql(SET_ITEM_COLUMN, json!({ "input": input }))?;

        Ok(ProjectCard {
            id: item_id,
            column: Some(option.name.clone()),
            issue: Some(issue_number),
            title: issue.title,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::super::RepoSlug;
    use super::*;
    use crate::tracker::IssueTracker;
    use mockito::{Matcher, Mock, Server};

    fn client(server: &Server) -> GitHubClient {
        GitHubClient::new(
            &server.url(),
            "test-token",
            RepoSlug::parse("acme/widgets").unwrap(),
        )
        .unwrap()
    }

    fn graphql(server: &mut Server, operation: &str, data: Value) -> Mock {
        server
            .mock("POST", "/graphql")
            .match_header("authorization", "Bearer test-token")
            .match_body(Matcher::Regex(operation.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "data": data }).to_string())
            .create()
    }

    fn board(items: Value) -> Value {
        json!({
            "id": "PVT_1", "number": 3, "title": "Sprint", "shortDescription": "Two weeks",
            "url": "https://github.com/orgs/acme/projects/3",
            "field": { "id": "F_status", "options": [
                { "id": "O_todo", "name": "To Do" },
                { "id": "O_done", "name": "Done" }
            ]},
            "items": { "nodes": items }
        })
    }

    #[test]
    fn create_repository_board_sets_columns() {
        let mut server = Server::new();
        let repo = graphql(
            &mut server,
            r"repository\(owner: \$owner, name: \$name\) \{ id",
            json!({ "repository": { "id": "R_1", "owner": { "id": "U_1" } } }),
        );
        let created = server
            .mock("POST", "/graphql")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("createProjectV2".to_string()),
                Matcher::PartialJson(json!({ "variables": { "input": {
                    "ownerId": "U_1", "repositoryId": "R_1", "title": "Sprint"
                }}})),
            ]))
            .with_status(200)
            .with_body(
                json!({ "data": { "createProjectV2": { "projectV2": {
                    "id": "PVT_1", "number": 3, "title": "Sprint", "url": "u",
                    "field": { "id": "F_status", "options": [{ "id": "x", "name": "Todo" }] }
                }}}})
                .to_string(),
            )
            .create();
        let described = graphql(
            &mut server,
            r"updateProjectV2\(",
            json!({ "updateProjectV2": { "projectV2": { "id": "PVT_1" } } }),
        );
        let columns = server
            .mock("POST", "/graphql")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("updateProjectV2Field".to_string()),
                Matcher::PartialJson(json!({ "variables": { "input": { "fieldId": "F_status" } } })),
            ]))
            .with_status(200)
            .with_body(
                json!({ "data": { "updateProjectV2Field": { "projectV2Field": {
                    "id": "F_status",
                    "options": [{ "id": "a", "name": "To Do" }, { "id": "b", "name": "Done" }]
                }}}})
                .to_string(),
            )
            .create();

        let project = client(&server)
            .create_project(&NewProject {
                title: "Sprint".to_string(),
                description: "Two weeks".to_string(),
                owner: ProjectOwner::Repository,
                columns: vec!["To Do".to_string(), "Done".to_string()],
            })
            .unwrap();
        repo.assert();
        created.assert();
        described.assert();
        columns.assert();
        assert_eq!(project.id, "PVT_1");
        assert_eq!(project.description, "Two weeks");
        assert_eq!(project.columns, vec!["To Do", "Done"]);
    }

    #[test]
    fn create_without_columns_sends_nothing() {
        let server = Server::new();
        let err = client(&server)
            .create_project(&NewProject {
                title: "Empty".to_string(),
                description: String::new(),
                owner: ProjectOwner::Viewer,
                columns: Vec::new(),
            })
            .unwrap_err();
        assert!(matches!(err, TrellisError::NoColumns(ref t) if t == "Empty"));
    }

    #[test]
    fn unknown_organization_is_remote_404() {
        let mut server = Server::new();
        graphql(&mut server, "organization", json!({ "organization": null }));
        let err = client(&server)
            .create_project(&NewProject {
                title: "Board".to_string(),
                description: String::new(),
                owner: ProjectOwner::Organization("ghost".to_string()),
                columns: vec!["To Do".to_string()],
            })
            .unwrap_err();
        assert!(matches!(err, TrellisError::Remote { status: 404, ref message } if message.contains("ghost")));
    }

    #[test]
    fn get_project_maps_cards_to_columns() {
        let mut server = Server::new();
        graphql(
            &mut server,
            r"node\(id: \$id\)",
            json!({ "node": board(json!([
                { "id": "I_1", "fieldValueByName": { "name": "Done" },
                  "content": { "number": 7, "title": "Login" } },
                { "id": "I_2", "fieldValueByName": null,
                  "content": { "title": "Draft idea" } }
            ])) }),
        );
        let project = client(&server).get_project("PVT_1").unwrap();
        assert_eq!(project.columns, vec!["To Do", "Done"]);
        assert_eq!(project.description, "Two weeks");
        assert_eq!(project.cards.len(), 2);
        assert_eq!(project.cards[0].issue, Some(7));
        assert_eq!(project.cards_in("Done").count(), 1);
        assert_eq!(project.cards[1].issue, None);
        assert_eq!(project.cards[1].column, None);
        assert_eq!(project.cards[1].title, "Draft idea");
    }

    #[test]
    fn missing_project_is_not_found() {
        let mut server = Server::new();
        server
            .mock("POST", "/graphql")
            .with_status(200)
            .with_body(
                json!({ "data": { "node": null }, "errors": [
                    { "type": "NOT_FOUND", "message": "Could not resolve to a node with the global id of 'nope'" }
                ]})
                .to_string(),
            )
            .create();
        assert!(matches!(
            client(&server).get_project("nope"),
            Err(TrellisError::ProjectNotFound(ref id)) if id == "nope"
        ));
    }

    #[test]
    fn non_project_node_is_not_found() {
        let mut server = Server::new();
        graphql(&mut server, "node", json!({ "node": {} }));
        assert!(matches!(
            client(&server).get_project("I_kwDO"),
            Err(TrellisError::ProjectNotFound(_))
        ));
    }

    #[test]
    fn other_graphql_errors_are_remote_422() {
        let mut server = Server::new();
        server
            .mock("POST", "/graphql")
            .with_status(200)
            .with_body(r#"{"errors":[{"message":"Resource not accessible by integration"}]}"#)
            .create();
        assert!(matches!(
            client(&server).get_project("PVT_1"),
            Err(TrellisError::Remote { status: 422, ref message }) if message.starts_with("Resource")
        ));
    }

    #[test]
    fn add_issue_sets_the_column_option() {
        let mut server = Server::new();
        graphql(&mut server, r"node\(id: \$id\)", json!({ "node": board(json!([])) }));
        graphql(
            &mut server,
            r"issue\(number: \$number\)",
            json!({ "repository": { "issue": { "id": "I_node", "title": "Login" } } }),
        );
        let added = server
            .mock("POST", "/graphql")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("addProjectV2ItemById".to_string()),
                Matcher::PartialJson(json!({ "variables": { "input": {
                    "projectId": "PVT_1", "contentId": "I_node"
                }}})),
            ]))
            .with_status(200)
            .with_body(json!({ "data": { "addProjectV2ItemById": { "item": { "id": "PVTI_9" } } } }).to_string())
            .create();
        let moved = server
            .mock("POST", "/graphql")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("updateProjectV2ItemFieldValue".to_string()),
                Matcher::PartialJson(json!({ "variables": { "input": {
                    "itemId": "PVTI_9", "fieldId": "F_status",
                    "value": { "singleSelectOptionId": "O_done" }
                }}})),
            ]))
            .with_status(200)
            .with_body(json!({ "data": { "updateProjectV2ItemFieldValue": { "projectV2Item": { "id": "PVTI_9" } } } }).to_string())
            .create();

        let card = client(&server)
            .add_issue_to_project("PVT_1", 7, "Done")
            .unwrap();
        added.assert();
        moved.assert();
        assert_eq!(card.id, "PVTI_9");
        assert_eq!(card.column.as_deref(), Some("Done"));
        assert_eq!(card.title, "Login");
    }

    #[test]
    fn add_issue_to_unknown_column_fails_before_mutating() {
        let mut server = Server::new();
        graphql(&mut server, r"node\(id: \$id\)", json!({ "node": board(json!([])) }));
        let add = server
            .mock("POST", "/graphql")
            .match_body(Matcher::Regex("addProjectV2ItemById".to_string()))
            .expect(0)
            .create();
        let err = client(&server)
            .add_issue_to_project("PVT_1", 7, "Review")
            .unwrap_err();
        add.assert();
        assert!(matches!(err, TrellisError::ColumnNotFound { ref column, .. } if column == "Review"));
    }
}

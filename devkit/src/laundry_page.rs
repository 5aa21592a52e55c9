/*!
Construction de pages HTML au format du tableau upstream

Reproduit la structure de laundrytrackerconnect.com : deux lignes d'en-tête,
une ligne par machine (cellules `name`, `type`, `status`, `time`), puis une
ligne de pied sans classe.
*/

#[derive(Debug, Clone)]
struct Row {
    name: Option<String>,
    kind: String,
    status: String,
    time: String,
}

/// Builder de page de laverie
#[derive(Debug, Clone)]
pub struct LaundryPageBuilder {
    title: String,
    rows: Vec<Row>,
}

impl LaundryPageBuilder {
    pub fn new() -> Self {
        Self {
            title: "Laundry Room".to_string(),
            rows: Vec::new(),
        }
    }

    pub fn title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = title.into();
        self
    }

    /// Ajoute une machine ; `time` vide est rendu comme `&nbsp;` comme upstream
    pub fn machine(mut self, name: &str, kind: &str, status: &str, time: &str) -> Self {
        self.rows.push(Row {
            name: Some(name.to_string()),
            kind: kind.to_string(),
            status: status.to_string(),
            time: time.to_string(),
        });
        self
    }

    /// Ligne dont la cellule de nom n'a pas la classe `name`
    pub fn unnamed_row(mut self, kind: &str, status: &str, time: &str) -> Self {
        self.rows.push(Row {
            name: None,
            kind: kind.to_string(),
            status: status.to_string(),
            time: time.to_string(),
        });
        self
    }

    pub fn machine_count(&self) -> usize {
        self.rows.iter().filter(|r| r.name.is_some()).count()
    }

    pub fn build(&self) -> String {
        let mut html = String::from("<html><body><table><tbody>\n");
        html.push_str(&format!("<tr><td colspan=\"4\">{}</td></tr>\n", escape(&self.title)));
        html.push_str("<tr><td>Machine</td><td>Type</td><td>Status</td><td>Time</td></tr>\n");

        for row in &self.rows {
            let name_cell = match &row.name {
                Some(name) => format!("<td class=\"name\">{}</td>", escape(name)),
                None => "<td></td>".to_string(),
            };
            let time = if row.time.is_empty() {
                "&nbsp;".to_string()
            } else {
                escape(&row.time).replace(' ', "&nbsp;")
            };
            html.push_str(&format!(
                "<tr>{}<td class=\"type\">{}</td><td class=\"status\">{}</td><td class=\"time\">{}</td></tr>\n",
                name_cell,
                escape(&row.kind),
                escape(&row.status),
                time
            ));
        }

        html.push_str("<tr><td colspan=\"4\">Last refreshed by upstream</td></tr>\n");
        html.push_str("</tbody></table></body></html>\n");
        html
    }
}

impl Default for LaundryPageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

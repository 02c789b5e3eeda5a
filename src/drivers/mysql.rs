use std::path::Path;

use super::native::{self, Target, ToolRun};
use super::{DriverContext, SnapshotDriver};
use crate::error::DriverError;

/// `mysqldump` / `mysql`, locally or inside the database container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MySqlDriver;

impl MySqlDriver {
    /// `-h -P -u` plus `-p<password>` glued together; no `-p` at all when the
    /// password is empty, so the client never stops to prompt.
    fn connection(cx: &DriverContext<'_>, password: &str) -> Vec<String> {
        let db = &cx.executor.project().database;
        let mut args = native::connection_args(&[
            ("-h", &db.host),
            ("-P", &db.port),
            ("-u", &db.user),
        ]);
        if !password.is_empty() {
            args.push(format!("-p{}", password));
        }
        args
    }
}

impl SnapshotDriver for MySqlDriver {
    fn name(&self) -> &'static str { "mysql" }

    fn extension(&self) -> &'static str { ".sql" }

    fn dump(&self, cx: &mut DriverContext<'_>, out: &Path) -> Result<(), DriverError> {
        let tools = cx.executor.tools().mysql.clone();
        let password = native::resolve_password(cx);
        let target = native::locate(cx, &tools);
        let tmp = cx.executor.tools().container_tmp_path.clone();

        let file = match &target {
            Target::Local => out.display().to_string(),
            Target::Container(_) => tmp.clone(),
        };
        let mut args = Self::connection(cx, &password);
        args.push("--add-drop-table".into());
        args.push(format!("--result-file={}", file));
        args.push(cx.executor.project().database.name.clone());

        native::run_tool(
            cx,
            &target,
            ToolRun {
                program: &tools.dump,
                args,
                env: Vec::new(),
                stdin: None,
            },
        )?;
        if let Target::Container(container) = &target {
            native::copy_out(cx, container, &tmp, out)?;
        }
        Ok(())
    }

    fn restore(&self, cx: &mut DriverContext<'_>, payload: &Path) -> Result<(), DriverError> {
        let tools = cx.executor.tools().mysql.clone();
        let password = native::resolve_password(cx);
        let target = native::locate(cx, &tools);

        let mut args = Self::connection(cx, &password);
        args.push(cx.executor.project().database.name.clone());

        let stdin = match &target {
            Target::Local => Some(payload),
            Target::Container(container) => {
                let tmp = cx.executor.tools().container_tmp_path.clone();
                native::copy_into(cx, container, payload, &tmp)?;
                args.push("-e".into());
                args.push(format!("source {}", tmp));
                None
            }
        };

        native::run_tool(
            cx,
            &target,
            ToolRun {
                program: &tools.restore,
                args,
                env: Vec::new(),
                stdin,
            },
        )?;
        Ok(())
    }
}

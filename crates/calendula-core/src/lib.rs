pub mod calendar;
pub mod calendar_math;
pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod occurrence;
pub mod query;
pub mod render;
pub mod task;
pub mod view;

use std::ffi::OsString;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  Datelike,
  Utc
};
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::cli::{
  CalendarAction,
  Command,
  MonthArgs,
  TaskAction
};
use crate::query::TaskStore;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting calendula"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.rc_file.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let settings = cfg.settings()?;
  let data_dir =
    config::resolve_data_dir(
      &settings,
      cli.data.as_deref()
    );

  let store =
    datastore::DataStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;

  let renderer =
    render::Renderer::new(
      settings.color
    );
  let default_calendar =
    settings.default_calendar;

  match cli.command.unwrap_or_else(
    || {
      Command::Month(
        MonthArgs::default()
      )
    }
  ) {
    | Command::Month(args) => {
      let calendar_id = args
        .calendar
        .unwrap_or(default_calendar);
      let requested_view_past = args
        .view_past()
        .unwrap_or(settings.view_past);
      show_month(
        &store,
        &renderer,
        calendar_id,
        &args,
        requested_view_past
      )?;
    }
    | Command::Calendars => {
      renderer.print_calendars(
        &store.calendars()?
      )?;
    }
    | Command::Calendar {
      action
    } => {
      run_calendar_action(
        &store, action
      )?;
    }
    | Command::Task {
      action
    } => {
      run_task_action(
        &store,
        &renderer,
        default_calendar,
        action
      )?;
    }
  }

  info!("done");
  Ok(())
}

fn require_calendar(
  store: &datastore::DataStore,
  calendar_id: u64
) -> anyhow::Result<
  calendar::CalendarSettings
> {
  store
    .calendar(calendar_id)?
    .ok_or_else(|| {
      anyhow!(
        "calendar not found: \
         {calendar_id}"
      )
    })
}

fn show_month(
  store: &datastore::DataStore,
  renderer: &render::Renderer,
  calendar_id: u64,
  args: &MonthArgs,
  requested_view_past: bool
) -> anyhow::Result<()> {
  let calendar =
    require_calendar(store, calendar_id)?;
  let now = clock::calendar_now(
    &calendar.time_zone,
    Utc::now()
  );

  let (year, month) = match args.date
  {
    | Some(ym) => (ym.year, ym.month),
    | None => (
      args.year.unwrap_or(now.year()),
      args.month.unwrap_or(now.month())
    )
  };

  let month_view =
    view::load_calendar_month(
      store,
      calendar,
      year,
      month,
      requested_view_past,
      now
    )?;
  if args.json {
    renderer
      .print_month_json(&month_view)
  } else {
    renderer
      .print_month(&month_view, now.date())
  }
}

fn run_task_action(
  store: &datastore::DataStore,
  renderer: &render::Renderer,
  default_calendar: u64,
  action: TaskAction
) -> anyhow::Result<()> {
  match action {
    | TaskAction::Show {
      id,
      calendar,
      json
    } => {
      let calendar_id = calendar
        .unwrap_or(default_calendar);
      let task = store
        .task(calendar_id, id)?
        .ok_or_else(|| {
          anyhow!(
            "task {id} not found in \
             calendar {calendar_id}"
          )
        })?;
      if json {
        renderer.print_task_json(&task)?;
      } else {
        let calendar = require_calendar(
          store,
          calendar_id
        )?;
        renderer.print_task_info(
          &task, &calendar
        )?;
      }
    }
    | TaskAction::Add {
      calendar,
      fields
    } => {
      let task = commands::add_task(
        store,
        calendar
          .unwrap_or(default_calendar),
        fields.into_edit()
      )?;
      println!(
        "Created task {}.",
        task.id
      );
    }
    | TaskAction::Modify {
      id,
      calendar,
      fields
    } => {
      commands::modify_task(
        store,
        calendar
          .unwrap_or(default_calendar),
        id,
        fields.into_edit()
      )?;
      println!("Modified task {id}.");
    }
    | TaskAction::Delete {
      id,
      calendar
    } => {
      commands::delete_task(
        store,
        calendar
          .unwrap_or(default_calendar),
        id
      )?;
      println!("Deleted task {id}.");
    }
    | TaskAction::MoveDay {
      id,
      day,
      calendar
    } => {
      let task = commands::move_task_day(
        store,
        calendar
          .unwrap_or(default_calendar),
        id,
        day
      )?;
      println!(
        "Moved task {id} to {}.",
        task.start_time.date()
      );
    }
  }
  Ok(())
}

fn run_calendar_action(
  store: &datastore::DataStore,
  action: CalendarAction
) -> anyhow::Result<()> {
  match action {
    | CalendarAction::Add {
      name,
      fields
    } => {
      let settings = fields
        .into_edit(Some(name))
        .apply(
          calendar::CalendarSettings::new(
            0,
            String::new()
          )
        );
      let calendar =
        commands::add_calendar(
          store, settings
        )?;
      println!(
        "Created calendar {} ({}).",
        calendar.id, calendar.name
      );
    }
    | CalendarAction::Modify {
      id,
      name,
      fields
    } => {
      commands::modify_calendar(
        store,
        id,
        fields.into_edit(name)
      )?;
      println!("Modified calendar {id}.");
    }
    | CalendarAction::Delete {
      id
    } => {
      let (calendar, dropped) =
        commands::delete_calendar(
          store, id
        )?;
      println!(
        "Deleted calendar {} ({}) and \
         {dropped} task(s).",
        calendar.id, calendar.name
      );
    }
  }
  Ok(())
}

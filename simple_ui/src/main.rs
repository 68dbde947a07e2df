use cursive::{
    view::{Nameable, Resizable},
    views::{Button, Dialog, DummyView, LinearLayout, SelectView, TextView},
    Cursive,
};
use cursive_table_view::{TableView, TableViewItem};
use log::warn;
use vm_simulator::paging::{PageTableEntry, VirtualAddress};
use vm_simulator::process_manager::Pid;
use vm_simulator::DefaultSimulator;

const PROCESSES: &str = "processes";
const PAGE_TABLE: &str = "page table";
const STATUS: &str = "status";

#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
enum PageColumn {
    Page,
    Present,
    Writable,
    Frame,
    ShareCount,
    CopyOnWrite,
}

#[derive(Debug, Clone, Copy)]
struct PageRow {
    vpn: u32,
    entry: PageTableEntry,
    share_count: u32,
}

fn yes_no(flag: bool) -> String {
    if flag { "Yes" } else { "No" }.to_string()
}

impl TableViewItem<PageColumn> for PageRow {
    fn to_column(&self, column: PageColumn) -> String {
        match column {
            PageColumn::Page => self.vpn.to_string(),
            PageColumn::Present => yes_no(self.entry.is_present()),
            PageColumn::Writable => yes_no(self.entry.is_writable()),
            PageColumn::Frame => self
                .entry
                .frame_index()
                .map(|frame| frame.to_string())
                .unwrap_or_default(),
            PageColumn::ShareCount => self.share_count.to_string(),
            PageColumn::CopyOnWrite => yes_no(self.entry.is_copy_on_write()),
        }
    }

    fn cmp(&self, other: &Self, column: PageColumn) -> std::cmp::Ordering
    where
        Self: Sized,
    {
        match column {
            PageColumn::Frame => self.entry.frame_index().cmp(&other.entry.frame_index()),
            PageColumn::ShareCount => self.share_count.cmp(&other.share_count),
            _ => self.vpn.cmp(&other.vpn),
        }
    }
}

fn make_table() -> TableView<PageRow, PageColumn> {
    let columns = [
        (PageColumn::Page, "V.Page"),
        (PageColumn::Present, "Present"),
        (PageColumn::Writable, "Writable"),
        (PageColumn::Frame, "Frame"),
        (PageColumn::ShareCount, "Share count"),
        (PageColumn::CopyOnWrite, "COW"),
    ];
    let mut table = TableView::<PageRow, PageColumn>::new();
    for (i, (column, title)) in columns.into_iter().enumerate() {
        table.insert_column(i, column, title, |c| c);
    }
    table
}

fn page_rows(simulator: &DefaultSimulator, pid: Pid) -> Vec<PageRow> {
    match simulator.process(pid) {
        Some(process) => process
            .pages()
            .map(|(vpn, entry)| PageRow {
                vpn,
                entry,
                share_count: entry
                    .frame_index()
                    .map(|frame| simulator.frames().share_count(frame))
                    .unwrap_or(0),
            })
            .collect(),
        None => Vec::new(),
    }
}

fn selected_pid(s: &mut Cursive) -> Option<Pid> {
    s.call_on_name(PROCESSES, |view: &mut SelectView<Pid>| {
        view.selection().map(|pid| *pid)
    })
    .flatten()
}

fn set_status(s: &mut Cursive, message: String) {
    s.call_on_name(STATUS, |view: &mut TextView| view.set_content(message));
}

fn show_page_table(s: &mut Cursive, pid: Pid) {
    let rows = match s.user_data::<DefaultSimulator>() {
        Some(simulator) => page_rows(simulator, pid),
        None => return,
    };
    s.call_on_name(PAGE_TABLE, |table: &mut TableView<PageRow, PageColumn>| {
        table.set_items(rows);
    });
}

/// Rebuilds the process list, keeping `select` selected when it is alive.
fn refresh(s: &mut Cursive, select: Option<Pid>) {
    let pids = match s.user_data::<DefaultSimulator>() {
        Some(simulator) => simulator.processes().pids(),
        None => return,
    };
    let shown = select
        .filter(|pid| pids.contains(pid))
        .or_else(|| pids.first().copied());
    s.call_on_name(PROCESSES, |view: &mut SelectView<Pid>| {
        view.clear();
        for pid in &pids {
            view.add_item(format!("PID {}", pid), *pid);
        }
        if let Some(index) = shown.and_then(|pid| pids.iter().position(|p| *p == pid)) {
            let _ = view.set_selection(index);
        }
    });
    match shown {
        Some(pid) => show_page_table(s, pid),
        None => {
            s.call_on_name(PAGE_TABLE, |table: &mut TableView<PageRow, PageColumn>| {
                table.clear();
            });
        }
    }
}

fn on_fork(s: &mut Cursive) {
    let Some(parent) = selected_pid(s) else {
        return;
    };
    let result = match s.user_data::<DefaultSimulator>() {
        Some(simulator) => simulator.fork(parent),
        None => return,
    };
    match result {
        Ok(child) => {
            set_status(s, format!("forked {} -> {}", parent, child));
            refresh(s, Some(child));
        }
        Err(err) => {
            warn!("fork of {} failed: {}", parent, err);
            set_status(s, format!("fork failed: {}", err));
        }
    }
}

fn on_write(s: &mut Cursive) {
    let Some(pid) = selected_pid(s) else {
        return;
    };
    let vpn = s
        .call_on_name(PAGE_TABLE, |table: &mut TableView<PageRow, PageColumn>| {
            table
                .item()
                .and_then(|index| table.borrow_item(index).map(|row| row.vpn))
        })
        .flatten();
    let Some(vpn) = vpn else {
        set_status(s, "select a page first".to_string());
        return;
    };
    let result = match s.user_data::<DefaultSimulator>() {
        Some(simulator) => simulator.write(pid, VirtualAddress::from_page(vpn, 0).raw()),
        None => return,
    };
    match result {
        Ok(pa) => set_status(s, format!("page {} of {} written at {}", vpn, pid, pa)),
        Err(err) => set_status(s, format!("write failed: {}", err)),
    }
    refresh(s, Some(pid));
}

fn on_exit(s: &mut Cursive) {
    let Some(pid) = selected_pid(s) else {
        return;
    };
    let result = match s.user_data::<DefaultSimulator>() {
        Some(simulator) => simulator.exit(pid),
        None => return,
    };
    match result {
        Ok(released) => set_status(s, format!("{} exited, {} frame(s) released", pid, released)),
        Err(err) => set_status(s, format!("exit failed: {}", err)),
    }
    refresh(s, None);
}

fn main() {
    let mut simulator = DefaultSimulator::init();
    if let Err(err) = simulator.create_initial_process() {
        eprintln!("could not create the initial process: {}", err);
        return;
    }

    let mut siv = cursive::default();
    siv.add_global_callback('q', |s| s.quit());
    siv.set_user_data(simulator);

    let select = SelectView::<Pid>::new()
        .on_select(|s, pid| show_page_table(s, *pid))
        .with_name(PROCESSES)
        .fixed_size((12, 12));
    let table = make_table().with_name(PAGE_TABLE).min_size((72, 12));
    let buttons = LinearLayout::vertical()
        .child(Button::new("Fork", on_fork))
        .child(Button::new("Write", on_write))
        .child(Button::new("Exit", on_exit))
        .child(DummyView)
        .child(Button::new("Quit", |s| s.quit()));
    let body = LinearLayout::vertical()
        .child(
            LinearLayout::horizontal()
                .child(select)
                .child(table)
                .child(buttons),
        )
        .child(TextView::new("").with_name(STATUS));

    siv.add_layer(Dialog::around(body).title("Virtual memory"));
    refresh(&mut siv, None);
    siv.run();
}

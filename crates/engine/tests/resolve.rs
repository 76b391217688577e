//! End-to-end resolutions against experiment trees on disk.

use std::fs;

use tempfile::TempDir;

use tempo_engine::{EngineError, Filters, ResolveRequest, resolve, root_module_name};
use tempo_types::{LoopArgs, NodeType};

const FLOW: &str = r#"<MODULE name="suite">
    <FAMILY name="assim">
      <TASK name="prep">
        <SUBMITS sub_name="run"/>
      </TASK>
      <TASK name="run"/>
      <TASK name="unit"/>
      <TASK name="unit12"/>
      <TASK name="unit_first"/>
    </FAMILY>
    <LOOP name="ferry">
      <TASK name="work"/>
      <TASK name="chain">
        <DEPENDS_ON dep_name="./work"/>
      </TASK>
    </LOOP>
  </MODULE>"#;

const DEFS: &str = "SEQ_DEFAULT_MACHINE=frontend\nSEQ_DEFAULT_ABORT_ACTION=stop\nBIG=hpc2\n";

fn experiment() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("EntryModule")).unwrap();
    fs::write(dir.path().join("EntryModule/flow.xml"), FLOW).unwrap();
    fs::create_dir_all(dir.path().join("resources")).unwrap();
    fs::write(dir.path().join("resources/resources.def"), DEFS).unwrap();
    dir
}

fn write_resource(dir: &TempDir, relative: &str, text: &str) {
    let path = dir.path().join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn request(dir: &TempDir, node: &str, datestamp: &str) -> ResolveRequest {
    let mut request = ResolveRequest::new(node, dir.path());
    request.datestamp = Some(datestamp.to_string());
    request
}

#[test]
fn task_resolution_with_batch_and_defaults() {
    let exp = experiment();
    write_resource(
        &exp,
        "resources/suite/assim/run.xml",
        r#"<NODE_RESOURCES>
             <BATCH machine="${BIG}" cpu="4x2" mpi="1" queue="ops" wallclock="30" soumet_args="-waste 50"/>
           </NODE_RESOURCES>"#,
    );
    let mut request = request(&exp, "/suite/assim/run", "2016010203");
    request.extra_submit_args = "-mach override".to_string();
    let descriptor = resolve(&request).unwrap();

    assert_eq!(descriptor.node_type, NodeType::Task);
    assert_eq!(descriptor.datestamp, "20160102030000");
    assert_eq!(descriptor.machine, "hpc2");
    assert_eq!(descriptor.npex, "4");
    assert_eq!(descriptor.omp, "2");
    assert_eq!(descriptor.queue, "ops");
    assert_eq!(descriptor.wallclock, 30);
    assert_eq!(descriptor.submit_args, "-waste 50 -mach override");
    // Nothing named a shell or an abort action, so the defaults apply.
    assert_eq!(descriptor.shell, "/bin/ksh");
    assert_eq!(descriptor.abort_actions, ["stop"]);
    // Structure comes from the flow definition.
    assert_eq!(descriptor.siblings, ["prep", "unit", "unit12", "unit_first"]);
    assert!(descriptor.submits.is_empty());
}

#[test]
fn leaf_submits_into_its_container() {
    let exp = experiment();
    let descriptor = resolve(&request(&exp, "/suite/assim/prep", "2016010200")).unwrap();
    assert_eq!(descriptor.submits, ["/suite/assim/run"]);
}

#[test]
fn missing_resource_file_is_synthesized() {
    let exp = experiment();
    let descriptor = resolve(&request(&exp, "/suite/assim/run", "2016010200")).unwrap();
    assert_eq!(descriptor.machine, "frontend");
    assert!(descriptor.cpu.is_empty());
    let on_disk = exp.path().join("resources/suite/assim/run.xml");
    assert!(
        fs::read_to_string(on_disk)
            .unwrap()
            .contains("NODE_RESOURCES")
    );
}

const GATED_CONTAINER: &str = r#"<NODE_RESOURCES>
    <LOOP start="0" end="23" step="1" set="4"/>
    <VALIDITY valid_hour="03">
      <LOOP expression="5:6:7:8"/>
    </VALIDITY>
    <VALIDITY valid_hour="12">
      <LOOP expression="9:10:11:12"/>
    </VALIDITY>
    <VALIDITY local_index="ferry=1">
      <LOOP expression="13:14:15:16"/>
    </VALIDITY>
  </NODE_RESOURCES>"#;

#[test]
fn loop_gates_select_by_hour_and_extension() {
    let exp = experiment();
    write_resource(
        &exp,
        "resources/suite/ferry/container.xml",
        GATED_CONTAINER,
    );

    let descriptor = resolve(&request(&exp, "/suite/ferry/work", "2016010203")).unwrap();
    assert_eq!(descriptor.loops[0].expression, "5:6:7:8");

    let descriptor = resolve(&request(&exp, "/suite/ferry/work", "2016010212")).unwrap();
    assert_eq!(descriptor.loops[0].expression, "9:10:11:12");

    let mut gated = request(&exp, "/suite/ferry/work", "2016010218");
    gated.loop_args = LoopArgs::parse("ferry=1").unwrap();
    let descriptor = resolve(&gated).unwrap();
    assert_eq!(descriptor.loops[0].expression, "13:14:15:16");
    assert_eq!(descriptor.extension, "+1");

    // No gate matches at hour 18 without the matching iteration.
    let descriptor = resolve(&request(&exp, "/suite/ferry/work", "2016010218")).unwrap();
    assert_eq!(descriptor.loops[0].expression, "");
    assert_eq!(descriptor.loops[0].end, "23");
}

#[test]
fn loop_node_carries_its_own_iteration_attributes() {
    let exp = experiment();
    write_resource(
        &exp,
        "resources/suite/ferry/container.xml",
        r#"<NODE_RESOURCES><LOOP start="0" end="5" step="1" set="2"/></NODE_RESOURCES>"#,
    );
    let mut request = request(&exp, "/suite/ferry", "2016010200");
    request.loop_args = LoopArgs::parse("ferry=3").unwrap();
    let descriptor = resolve(&request).unwrap();
    assert_eq!(descriptor.node_type, NodeType::Loop);
    assert_eq!(descriptor.data.get("TYPE").map(String::as_str), Some("Default"));
    assert_eq!(descriptor.data.get("END").map(String::as_str), Some("5"));
    assert_eq!(descriptor.loops.len(), 1);
    assert_eq!(descriptor.extension, "+3");
}

#[test]
fn flow_dependency_inherits_the_shared_loop_iteration() {
    let exp = experiment();
    let mut request = request(&exp, "/suite/ferry/chain", "2016010200");
    request.loop_args = LoopArgs::parse("ferry=2").unwrap();
    let descriptor = resolve(&request).unwrap();
    assert_eq!(descriptor.dependencies.len(), 1);
    let record = &descriptor.dependencies[0];
    assert_eq!(record.node_path, "/suite/ferry/work");
    assert_eq!(record.index, "+2");
    assert_eq!(record.local_index, "+2");
    assert_eq!(record.status, "end");
}

#[test]
fn worker_path_selected_by_hour_and_extension() {
    let exp = experiment();
    write_resource(
        &exp,
        "resources/suite/ferry/work.xml",
        r#"<NODE_RESOURCES>
             <WORKER path="/suite/assim/unit"/>
             <VALIDITY valid_hour="12">
               <WORKER path="/suite/assim/unit12"/>
             </VALIDITY>
             <VALIDITY local_index="ferry=1">
               <WORKER path="/suite/assim/unit_first"/>
             </VALIDITY>
           </NODE_RESOURCES>"#,
    );
    for unit in ["unit", "unit12", "unit_first"] {
        write_resource(
            &exp,
            &format!("resources/suite/assim/{unit}.xml"),
            r#"<NODE_RESOURCES><BATCH machine="w"/></NODE_RESOURCES>"#,
        );
    }

    let descriptor = resolve(&request(&exp, "/suite/ferry/work", "2016010203")).unwrap();
    assert_eq!(descriptor.worker_path, "/suite/assim/unit");

    let descriptor = resolve(&request(&exp, "/suite/ferry/work", "2016010212")).unwrap();
    assert_eq!(descriptor.worker_path, "/suite/assim/unit12");

    let mut request = request(&exp, "/suite/ferry/work", "2016010203");
    request.loop_args = LoopArgs::parse("ferry=1").unwrap();
    let descriptor = resolve(&request).unwrap();
    assert_eq!(descriptor.worker_path, "/suite/assim/unit_first");
}

#[test]
fn resource_dependency_with_token_binding() {
    let exp = experiment();
    write_resource(
        &exp,
        "resources/suite/ferry/work.xml",
        r#"<NODE_RESOURCES>
             <DEPENDS_ON dep_name="/suite/assim/run" local_index="ferry=$((it))" index="member=$((it))" status="end"/>
           </NODE_RESOURCES>"#,
    );
    let mut request = request(&exp, "/suite/ferry/work", "2016010200");
    request.loop_args = LoopArgs::parse("ferry=4").unwrap();
    let descriptor = resolve(&request).unwrap();
    let record = &descriptor.dependencies[0];
    assert_eq!(record.local_index, "+4");
    assert_eq!(record.index, "+4");
}

#[test]
fn worker_unit_resources_take_over() {
    let exp = experiment();
    write_resource(
        &exp,
        "resources/suite/assim/run.xml",
        r#"<NODE_RESOURCES>
             <BATCH cpu="1" queue="small"/>
             <WORKER path="/suite/assim/unit"/>
           </NODE_RESOURCES>"#,
    );
    write_resource(
        &exp,
        "resources/suite/assim/unit.xml",
        r#"<NODE_RESOURCES>
             <BATCH cpu="8x4" mpi="1" machine="bigiron" queue="workerq" soumet_args="-w 60"/>
           </NODE_RESOURCES>"#,
    );
    let descriptor = resolve(&request(&exp, "/suite/assim/run", "2016010200")).unwrap();
    assert_eq!(descriptor.worker_path, "/suite/assim/unit");
    assert_eq!(descriptor.machine, "bigiron");
    assert_eq!(descriptor.queue, "workerq");
    assert_eq!(descriptor.npex, "8");
    assert_eq!(descriptor.omp, "4");
    assert_eq!(descriptor.submit_args, "-w 60");
}

#[test]
fn worker_path_cycle_is_fatal() {
    let exp = experiment();
    write_resource(
        &exp,
        "resources/suite/assim/run.xml",
        r#"<NODE_RESOURCES>
             <BATCH machine="hpc1"/>
             <WORKER path="/suite/assim/unit"/>
           </NODE_RESOURCES>"#,
    );
    write_resource(
        &exp,
        "resources/suite/assim/unit.xml",
        r#"<NODE_RESOURCES>
             <WORKER path="/suite/assim/run"/>
           </NODE_RESOURCES>"#,
    );
    let error = resolve(&request(&exp, "/suite/assim/run", "2016010200")).unwrap_err();
    assert!(matches!(error, EngineError::WorkerCycle { path } if path == "/suite/assim/run"));
}

#[test]
fn unknown_batch_attribute_aborts_the_resolution() {
    let exp = experiment();
    write_resource(
        &exp,
        "resources/suite/assim/run.xml",
        r#"<NODE_RESOURCES><BATCH cpus="4"/></NODE_RESOURCES>"#,
    );
    let error = resolve(&request(&exp, "/suite/assim/run", "2016010200")).unwrap_err();
    assert!(matches!(error, EngineError::UnknownBatchAttribute { name, .. } if name == "cpus"));
}

#[test]
fn missing_machine_without_default_is_fatal() {
    let exp = experiment();
    fs::write(exp.path().join("resources/resources.def"), "").unwrap();
    let error = resolve(&request(&exp, "/suite/assim/run", "2016010200")).unwrap_err();
    assert!(matches!(error, EngineError::MachineUnresolved { .. }));
}

#[test]
fn resource_only_filters_skip_flow_structure_and_dependencies() {
    let exp = experiment();
    let mut request = request(&exp, "/suite/ferry/chain", "2016010200");
    request.filters = Filters::parse("res");
    let descriptor = resolve(&request).unwrap();
    // chain's only dependency is flow-declared, so the dep filter gates it.
    assert!(descriptor.dependencies.is_empty());
    assert!(descriptor.siblings.is_empty());
    assert_eq!(descriptor.machine, "frontend");
}

#[test]
fn resource_file_declarations_resolve_under_every_filter() {
    let exp = experiment();
    write_resource(
        &exp,
        "resources/suite/assim/run.xml",
        r#"<NODE_RESOURCES>
             <BATCH machine="hpc1" cpu="2"/>
             <DEPENDS_ON dep_name="./prep" status="end"/>
           </NODE_RESOURCES>"#,
    );
    let mut only_structure = request(&exp, "/suite/assim/run", "2016010200");
    only_structure.filters = Filters::parse("task");
    let descriptor = resolve(&only_structure).unwrap();
    assert_eq!(descriptor.machine, "hpc1");
    assert_eq!(descriptor.cpu, "2");
    assert_eq!(descriptor.dependencies.len(), 1);
    assert_eq!(descriptor.dependencies[0].node_path, "/suite/assim/prep");
}

#[test]
fn machine_check_fires_under_every_filter() {
    let exp = experiment();
    fs::write(exp.path().join("resources/resources.def"), "").unwrap();
    let mut deps_only = request(&exp, "/suite/assim/run", "2016010200");
    deps_only.filters = Filters::parse("dep");
    let error = resolve(&deps_only).unwrap_err();
    assert!(matches!(error, EngineError::MachineUnresolved { .. }));
}

#[test]
fn root_module_query() {
    let exp = experiment();
    assert_eq!(root_module_name(exp.path()).unwrap(), "suite");
}

#[test]
fn unknown_node_path_is_not_found() {
    let exp = experiment();
    let error = resolve(&request(&exp, "/suite/nowhere", "2016010200")).unwrap_err();
    assert!(matches!(error, EngineError::NodeNotFound { path } if path == "/suite/nowhere"));
}

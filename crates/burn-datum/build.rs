use protobuf_codegen::Codegen;

fn main() {
    // Generate the Datum protobuf module
    Codegen::new()
        .pure()
        .includes(["src/protos"])
        .input("src/protos/datum.proto")
        .cargo_out_dir("datum-protos")
        .run_from_script();
}
